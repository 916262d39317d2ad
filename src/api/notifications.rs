use super::AppState;
use crate::context::RequestContext;
use crate::notifications::{self, NotificationError};
use crate::tables::Notification;
use crate::NOTIFICATIONS_API;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status_code = match self {
            NotificationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NotificationError::NotFound => StatusCode::NOT_FOUND,
            NotificationError::PermissionDenied => StatusCode::FORBIDDEN,
        };
        if status_code.is_server_error() {
            error!(error = %self, "notification request failed");
        }

        (status_code, self.to_string()).into_response()
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CountResponse {
    pub count: usize,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            format!("/{NOTIFICATIONS_API}").as_str(),
            get(list_notifications),
        )
        .route(
            format!("/{NOTIFICATIONS_API}/unread_count").as_str(),
            get(unread_count),
        )
        .route(
            format!("/{NOTIFICATIONS_API}/read_all").as_str(),
            put(mark_all_read),
        )
        .route(
            format!("/{NOTIFICATIONS_API}/:id/read").as_str(),
            put(mark_read),
        )
        .route(
            format!("/{NOTIFICATIONS_API}/:id").as_str(),
            delete(delete_notification),
        )
}

async fn list_notifications(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<Notification>>, NotificationError> {
    let notifications =
        notifications::notifications_for_user(&state.store, &ctx, query.unread_only).await?;
    Ok(Json(notifications))
}

async fn unread_count(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<CountResponse>, NotificationError> {
    let count = notifications::unread_count(&state.store, &ctx).await?;
    Ok(Json(CountResponse { count }))
}

async fn mark_read(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>, NotificationError> {
    let notification = notifications::mark_read(&state.store, &ctx, &notification_id).await?;
    Ok(Json(notification))
}

async fn mark_all_read(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<CountResponse>, NotificationError> {
    let count = notifications::mark_all_read(&state.store, &ctx).await?;
    Ok(Json(CountResponse { count }))
}

async fn delete_notification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, NotificationError> {
    notifications::delete_notification(&state.store, &ctx, &notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
