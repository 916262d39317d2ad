use crate::context::RequestContext;
use crate::notifications;
use crate::permissions;
use crate::store::{DataStore, StoreError};
use crate::tables::{
    now, Application, ApplicationKind, ApplicationStatus, Capability, NotificationKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_REJECTION_REASON: &str = "no reason given";

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("application not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Validation(String),

    #[error("application was already {0}")]
    AlreadyDecided(&'static str),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewApplication {
    #[serde(rename = "type", default)]
    pub kind: ApplicationKind,
    pub title: String,
    pub content: String,
}

async fn load_application(store: &DataStore, id: &str) -> Result<Application, ApplicationError> {
    store
        .applications
        .load(id)
        .await?
        .ok_or(ApplicationError::NotFound)
}

fn newest_first(applications: &mut [Application]) {
    applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Active login accounts allowed to decide applications.
async fn approver_ids(store: &DataStore) -> Result<Vec<String>, StoreError> {
    Ok(store
        .users
        .list_all()
        .await?
        .into_iter()
        .filter(|u| u.is_active && !u.is_department)
        .filter(|u| permissions::has_permission(u, Capability::ApplicationApprove))
        .map(|u| u.id)
        .collect())
}

pub async fn create_application(
    store: &DataStore,
    ctx: &RequestContext,
    new_application: NewApplication,
) -> Result<Application, ApplicationError> {
    if new_application.title.trim().is_empty() || new_application.content.trim().is_empty() {
        return Err(ApplicationError::Validation(
            "title and content are required".to_string(),
        ));
    }

    let application = Application::new(
        ctx.actor.id.clone(),
        new_application.kind,
        new_application.title,
        new_application.content,
    );
    store.applications.save(&application).await?;
    info!(requester = %ctx.actor.id, application = %application.id, "created application");

    let approvers: Vec<String> = approver_ids(store)
        .await?
        .into_iter()
        .filter(|id| *id != ctx.actor.id)
        .collect();
    let notified = notifications::notify_many(
        store,
        &approvers,
        NotificationKind::Application,
        "New application to review",
        &format!(
            "{} submitted a new application: {}",
            ctx.actor.name, application.title
        ),
        Some(&application.id),
    )
    .await;
    if notified < approvers.len() {
        warn!(
            application = %application.id,
            notified,
            approvers = approvers.len(),
            "not every approver was notified"
        );
    }
    Ok(application)
}

async fn decide(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
    status: ApplicationStatus,
    reason: Option<String>,
) -> Result<Application, ApplicationError> {
    let mut application = load_application(store, id).await?;
    if !ctx.has(Capability::ApplicationApprove) {
        warn!(actor = %ctx.actor.id, application = %id, "application decision denied");
        return Err(ApplicationError::PermissionDenied);
    }
    if application.status != ApplicationStatus::Pending {
        return Err(ApplicationError::AlreadyDecided(application.status.as_str()));
    }

    let decided_at = now();
    application.status = status;
    application.approver_id = Some(ctx.actor.id.clone());
    application.decided_at = Some(decided_at);
    application.rejection_reason = reason;
    application.updated_at = decided_at;
    store.applications.save(&application).await?;
    info!(
        approver = %ctx.actor.id,
        application = %application.id,
        status = status.as_str(),
        "decided application"
    );

    let (title, content) = match status {
        ApplicationStatus::Rejected => (
            "Application rejected",
            format!(
                "Your application \"{}\" was rejected. Reason: {}",
                application.title,
                application.rejection_reason.as_deref().unwrap_or(DEFAULT_REJECTION_REASON)
            ),
        ),
        _ => (
            "Application approved",
            format!("Your application \"{}\" was approved", application.title),
        ),
    };
    if let Err(err) = notifications::notify_application(
        store,
        &application.user_id,
        &application.id,
        title,
        &content,
    )
    .await
    {
        warn!(application = %application.id, error = %err, "failed to notify requester");
    }
    Ok(application)
}

pub async fn approve(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<Application, ApplicationError> {
    decide(store, ctx, id, ApplicationStatus::Approved, None).await
}

pub async fn reject(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
    reason: Option<&str>,
) -> Result<Application, ApplicationError> {
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REJECTION_REASON)
        .to_string();
    decide(store, ctx, id, ApplicationStatus::Rejected, Some(reason)).await
}

pub async fn get_application(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<Application, ApplicationError> {
    let application = load_application(store, id).await?;
    let visible = application.user_id == ctx.actor.id
        || ctx.has(Capability::ApplicationManage)
        || ctx.has(Capability::ApplicationApprove);
    if visible {
        Ok(application)
    } else {
        Err(ApplicationError::PermissionDenied)
    }
}

pub async fn delete_application(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<(), ApplicationError> {
    let application = load_application(store, id).await?;
    if application.user_id != ctx.actor.id && !ctx.has(Capability::ApplicationManage) {
        return Err(ApplicationError::PermissionDenied);
    }
    store.applications.delete(&application.id).await?;
    info!(actor = %ctx.actor.id, application = %application.id, "deleted application");
    Ok(())
}

/// Everything for managers, otherwise the actor's own applications.
pub async fn applications_for(
    store: &DataStore,
    ctx: &RequestContext,
) -> Result<Vec<Application>, ApplicationError> {
    let mut applications = if ctx.has(Capability::ApplicationManage) {
        store.applications.list_all().await?
    } else {
        store
            .applications
            .find_by_key(&format!("requester:{}", ctx.actor.id))
            .await?
    };
    newest_first(&mut applications);
    Ok(applications)
}

pub async fn pending_applications(store: &DataStore) -> Result<Vec<Application>, StoreError> {
    let mut applications = store
        .applications
        .find_by_key(&format!("status:{}", ApplicationStatus::Pending.as_str()))
        .await?;
    newest_first(&mut applications);
    Ok(applications)
}
