use crate::context::RequestContext;
use crate::store::{DataStore, StoreError};
use crate::tables::{Notification, NotificationKind};
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("notification not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,
}

pub async fn create_notification(
    store: &DataStore,
    user_id: &str,
    kind: NotificationKind,
    title: &str,
    content: &str,
    related_id: Option<&str>,
) -> Result<Notification, StoreError> {
    let notification = Notification::new(
        user_id.to_string(),
        kind,
        title.to_string(),
        content.to_string(),
        related_id.map(str::to_string),
    );
    store.notifications.save(&notification).await?;
    debug!(recipient = %user_id, notification = %notification.id, "created notification");
    Ok(notification)
}

pub async fn notify_system(
    store: &DataStore,
    user_id: &str,
    title: &str,
    content: &str,
) -> Result<Notification, StoreError> {
    create_notification(store, user_id, NotificationKind::System, title, content, None).await
}

pub async fn notify_todo(
    store: &DataStore,
    user_id: &str,
    todo_id: &str,
    title: &str,
    content: &str,
) -> Result<Notification, StoreError> {
    create_notification(
        store,
        user_id,
        NotificationKind::Todo,
        title,
        content,
        Some(todo_id),
    )
    .await
}

pub async fn notify_chat(
    store: &DataStore,
    user_id: &str,
    chat_id: &str,
    sender_name: &str,
) -> Result<Notification, StoreError> {
    create_notification(
        store,
        user_id,
        NotificationKind::Chat,
        "New message",
        &format!("{sender_name} sent you a message"),
        Some(chat_id),
    )
    .await
}

pub async fn notify_application(
    store: &DataStore,
    user_id: &str,
    application_id: &str,
    title: &str,
    content: &str,
) -> Result<Notification, StoreError> {
    create_notification(
        store,
        user_id,
        NotificationKind::Application,
        title,
        content,
        Some(application_id),
    )
    .await
}

/// Creates one notification per recipient concurrently and returns how many
/// were written. Failures are logged and skipped.
pub async fn notify_many(
    store: &DataStore,
    user_ids: &[String],
    kind: NotificationKind,
    title: &str,
    content: &str,
    related_id: Option<&str>,
) -> usize {
    let futures = user_ids
        .iter()
        .map(|user_id| create_notification(store, user_id, kind, title, content, related_id));

    join_all(futures)
        .await
        .into_iter()
        .zip(user_ids)
        .filter(|(result, user_id)| match result {
            Ok(_) => true,
            Err(err) => {
                error!(recipient = %user_id, error = %err, "failed to create notification");
                false
            }
        })
        .count()
}

fn newest_first(notifications: &mut [Notification]) {
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

pub async fn notifications_for_user(
    store: &DataStore,
    ctx: &RequestContext,
    unread_only: bool,
) -> Result<Vec<Notification>, NotificationError> {
    let mut notifications: Vec<Notification> = store
        .notifications
        .find_by_key(&format!("recipient:{}", ctx.actor_id()))
        .await?
        .into_iter()
        .filter(|n| !unread_only || !n.is_read)
        .collect();
    newest_first(&mut notifications);
    Ok(notifications)
}

pub async fn unread_count(
    store: &DataStore,
    ctx: &RequestContext,
) -> Result<usize, NotificationError> {
    Ok(notifications_for_user(store, ctx, true).await?.len())
}

async fn load_own(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<Notification, NotificationError> {
    let notification = store
        .notifications
        .load(id)
        .await?
        .ok_or(NotificationError::NotFound)?;
    if notification.user_id != ctx.actor.id {
        return Err(NotificationError::PermissionDenied);
    }
    Ok(notification)
}

pub async fn mark_read(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<Notification, NotificationError> {
    let mut notification = load_own(store, ctx, id).await?;
    if !notification.is_read {
        notification.is_read = true;
        store.notifications.save(&notification).await?;
    }
    Ok(notification)
}

/// Returns the number of notifications that changed.
pub async fn mark_all_read(
    store: &DataStore,
    ctx: &RequestContext,
) -> Result<usize, NotificationError> {
    let unread = notifications_for_user(store, ctx, true).await?;
    let count = unread.len();
    for mut notification in unread {
        notification.is_read = true;
        store.notifications.save(&notification).await?;
    }
    Ok(count)
}

pub async fn delete_notification(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<(), NotificationError> {
    let notification = load_own(store, ctx, id).await?;
    store.notifications.delete(&notification.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::User;
    use tempfile::TempDir;

    fn ctx_for(id: &str) -> RequestContext {
        let mut user = User::new(
            id.into(),
            id.into(),
            id.into(),
            String::new(),
            "Staff".into(),
            vec![],
        );
        user.id = id.to_string();
        RequestContext::new(user)
    }

    #[tokio::test]
    async fn test_notify_many_writes_one_per_recipient() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path()).await.unwrap();
        let recipients = vec!["user_a".to_string(), "user_b".to_string()];

        let written = notify_many(
            &store,
            &recipients,
            NotificationKind::System,
            "Maintenance",
            "Tonight at 22:00",
            None,
        )
        .await;
        assert_eq!(written, 2);
        let b = ctx_for("user_b");
        let for_b = notifications_for_user(&store, &b, false).await.unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].title, "Maintenance");
    }

    #[tokio::test]
    async fn test_read_state_and_counts() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path()).await.unwrap();
        let alice = ctx_for("user_alice");

        let first = notify_system(&store, "user_alice", "One", "").await.unwrap();
        notify_todo(&store, "user_alice", "todo_1", "Two", "").await.unwrap();
        notify_system(&store, "user_bob", "Other", "").await.unwrap();

        assert_eq!(unread_count(&store, &alice).await.unwrap(), 2);
        let read = mark_read(&store, &alice, &first.id).await.unwrap();
        assert!(read.is_read);
        assert_eq!(unread_count(&store, &alice).await.unwrap(), 1);
        assert_eq!(notifications_for_user(&store, &alice, false).await.unwrap().len(), 2);

        assert_eq!(mark_all_read(&store, &alice).await.unwrap(), 1);
        assert_eq!(unread_count(&store, &alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_only_recipient_may_touch_a_notification() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path()).await.unwrap();
        let notification = notify_chat(&store, "user_alice", "chat_1", "Bob").await.unwrap();
        assert_eq!(notification.content, "Bob sent you a message");

        let bob = ctx_for("user_bob");
        assert!(matches!(
            mark_read(&store, &bob, &notification.id).await,
            Err(NotificationError::PermissionDenied)
        ));
        assert!(matches!(
            delete_notification(&store, &bob, &notification.id).await,
            Err(NotificationError::PermissionDenied)
        ));

        let alice = ctx_for("user_alice");
        delete_notification(&store, &alice, &notification.id).await.unwrap();
        assert!(matches!(
            mark_read(&store, &alice, &notification.id).await,
            Err(NotificationError::NotFound)
        ));
    }
}
