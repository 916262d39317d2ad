use super::hierarchy::users::{attach_child_user, detach_child_user, get_user_tree};
use super::AppState;
use crate::context::RequestContext;
use crate::tables::{Capability, User};
use crate::users::{self, NewUser, UserChanges, UserError};
use crate::{PERMISSIONS_API, USERS_API};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::error;

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let status_code = match self {
            UserError::Store(_) | UserError::Hash(_) | UserError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            UserError::NotFound => StatusCode::NOT_FOUND,
            UserError::PermissionDenied => StatusCode::FORBIDDEN,
            UserError::Validation(_) => StatusCode::BAD_REQUEST,
            UserError::Conflict(_) => StatusCode::CONFLICT,
        };
        if status_code.is_server_error() {
            error!(error = %self, "user request failed");
        }

        (status_code, self.to_string()).into_response()
    }
}

/// A user as exposed over HTTP. The password hash never leaves the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub code: String,
    pub username: String,
    pub position: String,
    pub permissions: Vec<Capability>,
    pub parent_id: Option<String>,
    pub subordinates: Vec<String>,
    pub is_active: bool,
    pub is_department: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            code: user.code,
            username: user.username,
            position: user.position,
            permissions: user.permissions,
            parent_id: user.parent_id,
            subordinates: user.subordinates,
            is_active: user.is_active,
            is_department: user.is_department,
            created_at: user.created_at,
            updated_at: user.updated_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PermissionResponse {
    pub key: Capability,
    pub label: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateDepartmentRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdatePermissionsRequest {
    pub permissions: Vec<Capability>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SubordinatesQuery {
    #[serde(default)]
    pub recursive: bool,
}

fn into_responses(users: Vec<User>) -> Vec<UserResponse> {
    users.into_iter().map(Into::into).collect()
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(format!("/{PERMISSIONS_API}").as_str(), get(list_permissions))
        .route(
            format!("/{USERS_API}").as_str(),
            get(list_users).post(create_user),
        )
        .route(
            format!("/{USERS_API}/departments").as_str(),
            post(create_department),
        )
        .route(
            format!("/{USERS_API}/manageable").as_str(),
            get(manageable_users),
        )
        .route(format!("/{USERS_API}/tree").as_str(), get(get_user_tree))
        .route(
            format!("/{USERS_API}/hierarchy/attach").as_str(),
            post(attach_child_user),
        )
        .route(
            format!("/{USERS_API}/hierarchy/detach/:id").as_str(),
            delete(detach_child_user),
        )
        .route(
            format!("/{USERS_API}/:id").as_str(),
            get(get_user).put(update_user).delete(delete_user),
        )
        .route(
            format!("/{USERS_API}/:id/permissions").as_str(),
            put(update_permissions),
        )
        .route(
            format!("/{USERS_API}/:id/subordinates").as_str(),
            get(list_subordinates),
        )
}

async fn list_permissions(_ctx: RequestContext) -> Json<Vec<PermissionResponse>> {
    Json(
        Capability::ALL
            .into_iter()
            .map(|key| PermissionResponse {
                key,
                label: key.label().to_string(),
            })
            .collect(),
    )
}

async fn list_users(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<UserResponse>>, UserError> {
    let users = users::list_users(&state.store, &ctx).await?;
    Ok(Json(into_responses(users)))
}

async fn get_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, UserError> {
    let user = users::get_user(&state.store, &ctx, &user_id).await?;
    Ok(Json(user.into()))
}

async fn create_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<UserResponse>), UserError> {
    let user = users::create_user(&state.store, &ctx, payload, state.config.bcrypt_cost).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn create_department(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<UserResponse>), UserError> {
    let department = users::create_department(&state.store, &ctx, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(department.into())))
}

async fn update_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
    Json(payload): Json<UserChanges>,
) -> Result<Json<UserResponse>, UserError> {
    let user = users::update_user(
        &state.store,
        &ctx,
        &user_id,
        payload,
        state.config.bcrypt_cost,
    )
    .await?;
    Ok(Json(user.into()))
}

async fn update_permissions(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdatePermissionsRequest>,
) -> Result<Json<UserResponse>, UserError> {
    let user =
        users::update_permissions(&state.store, &ctx, &user_id, payload.permissions).await?;
    Ok(Json(user.into()))
}

async fn delete_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
) -> Result<StatusCode, UserError> {
    users::delete_user(&state.store, &ctx, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn manageable_users(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<UserResponse>>, UserError> {
    let users = users::manageable_users(&state.store, &ctx).await?;
    Ok(Json(into_responses(users)))
}

async fn list_subordinates(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
    Query(query): Query<SubordinatesQuery>,
) -> Result<Json<Vec<UserResponse>>, UserError> {
    let users = users::subordinates(&state.store, &ctx, &user_id, query.recursive).await?;
    Ok(Json(into_responses(users)))
}
