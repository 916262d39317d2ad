//! A typed HTTP client for the back-office API, used by the `cli` binary.
pub use crate::api::auth::{ChangePasswordRequest, InitRequest, LoginResponse};
pub use crate::api::{AttachChildRequest, PermissionResponse, UserResponse, UserTreeNode};
use crate::auth::Credentials;
use crate::tables::SystemState;
use crate::{AUTH_API, DASHBOARD_API, SYSTEM_API};
use crate::dashboard::Dashboard;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub mod applications;
pub mod chats;
pub mod notifications;
pub mod todos;
pub mod users;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Not authenticated; log in first")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server returned {status}: {message}")]
    ServerError { status: u16, message: String },
}

/// A connection to one server, optionally carrying a session token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.post(self.url(path)))
    }

    pub(crate) fn put(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.put(self.url(path)))
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.delete(self.url(path)))
    }

    // ** System and session .................................................

    pub async fn status(&self) -> Result<SystemState, ClientError> {
        fetch_json(self.get(&format!("{SYSTEM_API}/status")), SYSTEM_API).await
    }

    pub async fn initialize(
        &self,
        name: &str,
        password: &str,
    ) -> Result<UserResponse, ClientError> {
        let payload = InitRequest {
            name: name.to_string(),
            password: password.to_string(),
        };
        fetch_json(
            self.post(&format!("{SYSTEM_API}/init")).json(&payload),
            SYSTEM_API,
        )
        .await
    }

    /// Logs in and keeps the returned token on this client.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, ClientError> {
        let payload = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let login: LoginResponse = fetch_json(
            self.post(&format!("{AUTH_API}/login")).json(&payload),
            AUTH_API,
        )
        .await?;
        self.token = Some(login.token.clone());
        Ok(login)
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        send(self.post(&format!("{AUTH_API}/logout")), AUTH_API).await?;
        self.token = None;
        Ok(())
    }

    pub async fn me(&self) -> Result<UserResponse, ClientError> {
        fetch_json(self.get(&format!("{AUTH_API}/me")), AUTH_API).await
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), ClientError> {
        let payload = ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
        };
        send(
            self.put(&format!("{AUTH_API}/password")).json(&payload),
            AUTH_API,
        )
        .await?;
        Ok(())
    }

    pub async fn dashboard(&self) -> Result<Dashboard, ClientError> {
        fetch_json(self.get(DASHBOARD_API), DASHBOARD_API).await
    }
}

/// Escapes one path segment taken from user input.
pub(crate) fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Sends the request and maps non-success statuses onto [`ClientError`].
pub(crate) async fn send(request: RequestBuilder, what: &str) -> Result<Response, ClientError> {
    let response = request.send().await?;
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(what.to_string())),
        status => Err(ClientError::ServerError {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        }),
    }
}

pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    what: &str,
) -> Result<T, ClientError> {
    Ok(send(request, what).await?.json::<T>().await?)
}
