//! Bearer-token sessions.
//!
//! A login hands out a random token once. Only its SHA-256 digest is kept
//! on disk, as the session file name, so the sessions directory cannot be
//! used to impersonate anyone.

use crate::context::RequestContext;
use crate::store::{DataStore, StoreError};
use crate::tables::{now, Session, User};
use crate::users::{self, verify_password};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("authentication required")]
    Unauthorized,

    #[error("system has not been initialized")]
    NotInitialized,

    #[error("Password check failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("session lifetime of {0} seconds is out of range")]
    SessionLifetime(i64),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub user: User,
}

pub fn session_id_for(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn login(
    store: &DataStore,
    credentials: &Credentials,
    ttl_secs: i64,
) -> Result<LoginOutcome, AuthError> {
    if !store.system.load().await?.initialized {
        return Err(AuthError::NotInitialized);
    }

    let Some(mut user) = users::find_by_username(store, &credentials.username).await? else {
        warn!(username = %credentials.username, reason = "unknown user", "login failed");
        return Err(AuthError::InvalidCredentials);
    };
    let refusal = if !user.is_active {
        Some("inactive account")
    } else if user.is_department {
        Some("department account")
    } else if !verify_password(&credentials.password, &user.password_hash).await? {
        Some("wrong password")
    } else {
        None
    };
    if let Some(reason) = refusal {
        warn!(username = %credentials.username, user = %user.id, reason, "login failed");
        return Err(AuthError::InvalidCredentials);
    }

    let token = format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    );
    let created_at = now();
    let expires_at = Duration::try_seconds(ttl_secs)
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .ok_or(AuthError::SessionLifetime(ttl_secs))?;
    let session = Session {
        id: session_id_for(&token),
        user_id: user.id.clone(),
        created_at,
        expires_at,
    };
    store.sessions.save(&session).await?;

    user.last_login = Some(created_at);
    store.users.save(&user).await?;
    info!(user = %user.id, username = %user.username, "logged in");

    Ok(LoginOutcome {
        token,
        expires_at: session.expires_at,
        user,
    })
}

/// Resolves a bearer token to the request context. Expired sessions are
/// removed on sight.
pub async fn authenticate(store: &DataStore, token: &str) -> Result<RequestContext, AuthError> {
    let session_id = session_id_for(token);
    let Some(session) = store.sessions.load(&session_id).await? else {
        return Err(AuthError::Unauthorized);
    };
    if session.is_expired() {
        store.sessions.delete(&session.id).await?;
        debug!(user = %session.user_id, "session expired");
        return Err(AuthError::Unauthorized);
    }

    match store.users.load(&session.user_id).await? {
        Some(user) if user.is_active && !user.is_department => {
            Ok(RequestContext::with_session(user, session.id))
        }
        _ => {
            warn!(user = %session.user_id, "session refers to a missing or disabled user");
            Err(AuthError::Unauthorized)
        }
    }
}

pub async fn logout(store: &DataStore, ctx: &RequestContext) -> Result<(), AuthError> {
    if let Some(session_id) = &ctx.session_id {
        store.sessions.delete(session_id).await?;
        info!(user = %ctx.actor.id, "logged out");
    }
    Ok(())
}

/// Deletes every expired session file and returns how many were removed.
pub async fn purge_expired_sessions(store: &DataStore) -> Result<usize, StoreError> {
    let mut removed = 0;
    for session in store.sessions.list_all().await? {
        if session.is_expired() && store.sessions.delete(&session.id).await? {
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, "purged expired sessions");
    }
    Ok(removed)
}
