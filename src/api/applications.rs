use super::AppState;
use crate::applications::{self, ApplicationError, NewApplication};
use crate::context::RequestContext;
use crate::tables::{Application, Capability};
use crate::APPLICATIONS_API;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let status_code = match self {
            ApplicationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApplicationError::NotFound => StatusCode::NOT_FOUND,
            ApplicationError::PermissionDenied => StatusCode::FORBIDDEN,
            ApplicationError::Validation(_) => StatusCode::BAD_REQUEST,
            ApplicationError::AlreadyDecided(_) => StatusCode::CONFLICT,
        };
        if status_code.is_server_error() {
            error!(error = %self, "application request failed");
        }

        (status_code, self.to_string()).into_response()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            format!("/{APPLICATIONS_API}").as_str(),
            get(list_applications).post(create_application),
        )
        .route(
            format!("/{APPLICATIONS_API}/pending").as_str(),
            get(list_pending),
        )
        .route(
            format!("/{APPLICATIONS_API}/:id").as_str(),
            get(get_application).delete(delete_application),
        )
        .route(
            format!("/{APPLICATIONS_API}/:id/approve").as_str(),
            put(approve),
        )
        .route(
            format!("/{APPLICATIONS_API}/:id/reject").as_str(),
            put(reject),
        )
}

async fn list_applications(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<Application>>, ApplicationError> {
    Ok(Json(applications::applications_for(&state.store, &ctx).await?))
}

async fn list_pending(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<Application>>, ApplicationError> {
    if !ctx.has(Capability::ApplicationApprove) && !ctx.has(Capability::ApplicationManage) {
        return Err(ApplicationError::PermissionDenied);
    }
    Ok(Json(applications::pending_applications(&state.store).await?))
}

async fn get_application(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(application_id): Path<String>,
) -> Result<Json<Application>, ApplicationError> {
    let application = applications::get_application(&state.store, &ctx, &application_id).await?;
    Ok(Json(application))
}

async fn create_application(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<NewApplication>,
) -> Result<(StatusCode, Json<Application>), ApplicationError> {
    let application = applications::create_application(&state.store, &ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

async fn approve(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(application_id): Path<String>,
) -> Result<Json<Application>, ApplicationError> {
    let application = applications::approve(&state.store, &ctx, &application_id).await?;
    Ok(Json(application))
}

async fn reject(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(application_id): Path<String>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<Application>, ApplicationError> {
    let application = applications::reject(
        &state.store,
        &ctx,
        &application_id,
        payload.reason.as_deref(),
    )
    .await?;
    Ok(Json(application))
}

async fn delete_application(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(application_id): Path<String>,
) -> Result<StatusCode, ApplicationError> {
    applications::delete_application(&state.store, &ctx, &application_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
