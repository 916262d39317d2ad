use super::users::UserResponse;
use super::AppState;
use crate::auth::{self, AuthError, Credentials};
use crate::context::RequestContext;
use crate::tables::SystemState;
use crate::users::{self, UserError};
use crate::{AUTH_API, SYSTEM_API};
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::error;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status_code = match self {
            AuthError::Store(_) | AuthError::Join(_) | AuthError::SessionLifetime(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AuthError::InvalidCredentials | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status_code.is_server_error() {
            error!(error = %self, "auth request failed");
        }

        let mut response = (status_code, self.to_string()).into_response();
        if status_code == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

/// Every route that names `RequestContext` as an argument sits behind the
/// bearer-token gate.
#[axum::async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Unauthorized)?;

        auth::authenticate(&state.store, token).await
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InitRequest {
    pub name: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub user: UserResponse,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(format!("/{SYSTEM_API}/status").as_str(), get(system_status))
        .route(format!("/{SYSTEM_API}/init").as_str(), post(initialize))
        .route(format!("/{AUTH_API}/login").as_str(), post(login))
        .route(format!("/{AUTH_API}/logout").as_str(), post(logout))
        .route(format!("/{AUTH_API}/me").as_str(), get(me))
        .route(format!("/{AUTH_API}/password").as_str(), put(change_password))
}

async fn system_status(State(state): State<AppState>) -> Result<Json<SystemState>, AuthError> {
    Ok(Json(state.store.system.load().await?))
}

async fn initialize(
    State(state): State<AppState>,
    Json(payload): Json<InitRequest>,
) -> Result<(StatusCode, Json<UserResponse>), UserError> {
    let admin = users::initialize(
        &state.store,
        &payload.name,
        &payload.password,
        state.config.bcrypt_cost,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(admin.into())))
}

async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<LoginResponse>, AuthError> {
    let outcome = auth::login(&state.store, &credentials, state.config.session_ttl_secs).await?;
    Ok(Json(LoginResponse {
        token: outcome.token,
        expires_at: outcome.expires_at,
        user: outcome.user.into(),
    }))
}

async fn logout(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<StatusCode, AuthError> {
    auth::logout(&state.store, &ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(ctx: RequestContext) -> Json<UserResponse> {
    Json(ctx.actor.into())
}

async fn change_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, UserError> {
    users::change_password(
        &state.store,
        &ctx,
        &payload.current_password,
        &payload.new_password,
        state.config.bcrypt_cost,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
