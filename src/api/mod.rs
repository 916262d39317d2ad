pub mod applications;
pub mod auth;
pub mod chats;
pub mod hierarchy;
pub mod notifications;
mod state;
pub mod todos;
pub mod users;
#[cfg(test)]
mod tests;

use crate::context::RequestContext;
use crate::dashboard::{self, Dashboard, DashboardError};
use crate::DASHBOARD_API;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
pub use hierarchy::users::{build_user_tree, AttachChildRequest, UserTreeNode};
pub use state::AppState;
pub use users::{PermissionResponse, UserResponse};
use tokio::time::{self, Duration};
use tracing::{error, info};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub fn create_router(state: AppState) -> Router {
    // Spawn session cleanup task
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(SESSION_PURGE_INTERVAL);
            loop {
                interval.tick().await;
                purge_expired_sessions(&state).await;
            }
        });
    }

    Router::new()
        .merge(auth::create_router())
        .merge(users::create_router())
        .merge(todos::create_router())
        .merge(chats::create_router())
        .merge(notifications::create_router())
        .merge(applications::create_router())
        .route(format!("/{DASHBOARD_API}").as_str(), get(get_dashboard))
        .with_state(state)
}

async fn purge_expired_sessions(state: &AppState) {
    info!("Starting expired session cleanup");
    if let Err(e) = crate::auth::purge_expired_sessions(&state.store).await {
        error!("Failed to purge expired sessions: {}", e);
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        match self {
            DashboardError::Todo(err) => err.into_response(),
            DashboardError::Notification(err) => err.into_response(),
            DashboardError::Store(err) => {
                error!(error = %err, "dashboard request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

async fn get_dashboard(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Dashboard>, DashboardError> {
    Ok(Json(dashboard::dashboard(&state.store, &ctx).await?))
}
