use super::AppState;
use crate::context::RequestContext;
use crate::tables::{Todo, TodoStatus};
use crate::todos::{self, NewTodo, TodoError};
use crate::TODOS_API;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

impl IntoResponse for TodoError {
    fn into_response(self) -> Response {
        let status_code = match self {
            TodoError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TodoError::NotFound => StatusCode::NOT_FOUND,
            TodoError::PermissionDenied => StatusCode::FORBIDDEN,
            TodoError::Validation(_) => StatusCode::BAD_REQUEST,
        };
        if status_code.is_server_error() {
            error!(error = %self, "todo request failed");
        }

        (status_code, self.to_string()).into_response()
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ListTodosQuery {
    #[serde(default)]
    pub include_subordinates: bool,
    #[serde(default)]
    pub pending: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusRequest {
    pub status: TodoStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReassignRequest {
    pub assignee_id: String,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            format!("/{TODOS_API}").as_str(),
            get(list_todos).post(create_todo),
        )
        .route(
            format!("/{TODOS_API}/:id").as_str(),
            get(get_todo).delete(delete_todo),
        )
        .route(
            format!("/{TODOS_API}/:id/status").as_str(),
            put(update_status),
        )
        .route(
            format!("/{TODOS_API}/:id/assignee").as_str(),
            put(reassign),
        )
}

async fn list_todos(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListTodosQuery>,
) -> Result<Json<Vec<Todo>>, TodoError> {
    let todos = if query.pending {
        todos::pending_todos_for_user(&state.store, &ctx).await?
    } else {
        todos::todos_for_user(&state.store, &ctx, query.include_subordinates).await?
    };
    Ok(Json(todos))
}

async fn get_todo(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(todo_id): Path<String>,
) -> Result<Json<Todo>, TodoError> {
    Ok(Json(todos::get_todo(&state.store, &ctx, &todo_id).await?))
}

async fn create_todo(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<NewTodo>,
) -> Result<(StatusCode, Json<Todo>), TodoError> {
    let todo = todos::create_todo(&state.store, &ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(todo_id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Todo>, TodoError> {
    let todo = todos::update_status(&state.store, &ctx, &todo_id, payload.status).await?;
    Ok(Json(todo))
}

async fn reassign(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(todo_id): Path<String>,
    Json(payload): Json<ReassignRequest>,
) -> Result<Json<Todo>, TodoError> {
    let todo = todos::reassign(&state.store, &ctx, &todo_id, &payload.assignee_id).await?;
    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(todo_id): Path<String>,
) -> Result<StatusCode, TodoError> {
    todos::delete_todo(&state.store, &ctx, &todo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
