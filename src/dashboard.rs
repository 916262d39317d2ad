use crate::applications;
use crate::context::RequestContext;
use crate::notifications::{self, NotificationError};
use crate::store::{DataStore, StoreError};
use crate::tables::{Capability, Notification, Todo};
use crate::todos::{self, TodoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const RECENT_LIMIT: usize = 5;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Todo(#[from] TodoError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub total_users: usize,
    pub direct_subordinates: usize,
    pub pending_todos: usize,
    pub unread_notifications: usize,
    /// Only counted for users who can act on applications.
    pub pending_applications: Option<usize>,
    pub recent_todos: Vec<Todo>,
    pub recent_notifications: Vec<Notification>,
}

pub async fn dashboard(
    store: &DataStore,
    ctx: &RequestContext,
) -> Result<Dashboard, DashboardError> {
    let total_users = store.users.list_all().await?.len();
    let todos = todos::todos_for_user(store, ctx, false).await?;
    let pending_todos = todos::pending_todos_for_user(store, ctx).await?.len();
    let notifications = notifications::notifications_for_user(store, ctx, false).await?;
    let unread_notifications = notifications.iter().filter(|n| !n.is_read).count();

    let pending_applications =
        if ctx.has(Capability::ApplicationApprove) || ctx.has(Capability::ApplicationManage) {
            Some(applications::pending_applications(store).await?.len())
        } else {
            None
        };

    Ok(Dashboard {
        total_users,
        direct_subordinates: ctx.actor.subordinates.len(),
        pending_todos,
        unread_notifications,
        pending_applications,
        recent_todos: todos.into_iter().take(RECENT_LIMIT).collect(),
        recent_notifications: notifications.into_iter().take(RECENT_LIMIT).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::User;
    use crate::todos::NewTodo;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_dashboard_counts() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path()).await.unwrap();
        let user = User::new(
            "Dana".into(),
            "E-1".into(),
            "dana".into(),
            String::new(),
            "Lead".into(),
            vec![Capability::TodoManage],
        );
        store.users.save(&user).await.unwrap();
        let ctx = RequestContext::new(user);

        for i in 0..7 {
            todos::create_todo(
                &store,
                &ctx,
                NewTodo {
                    title: format!("Task {i}"),
                    description: String::new(),
                    assignee_id: None,
                    priority: Default::default(),
                    due_date: None,
                },
            )
            .await
            .unwrap();
        }
        notifications::notify_system(&store, ctx.actor_id(), "Hello", "")
            .await
            .unwrap();

        let board = dashboard(&store, &ctx).await.unwrap();
        assert_eq!(board.total_users, 1);
        assert_eq!(board.pending_todos, 7);
        assert_eq!(board.recent_todos.len(), RECENT_LIMIT);
        assert_eq!(board.recent_todos[0].title, "Task 6");
        assert_eq!(board.unread_notifications, 1);
        assert_eq!(board.pending_applications, None);
    }
}
