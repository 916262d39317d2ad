use crate::context::RequestContext;
use crate::notifications;
use crate::permissions::{self, Action};
use crate::store::{DataStore, StoreError};
use crate::tables::{now, Todo, TodoPriority, TodoStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum TodoError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("todo not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the creator.
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub priority: TodoPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

async fn load_todo(store: &DataStore, id: &str) -> Result<Todo, TodoError> {
    store.todos.load(id).await?.ok_or(TodoError::NotFound)
}

async fn require(
    store: &DataStore,
    ctx: &RequestContext,
    action: Action,
    target: Option<&str>,
) -> Result<(), TodoError> {
    if permissions::check(&store.users, &ctx.actor, action, target).await? {
        Ok(())
    } else {
        Err(TodoError::PermissionDenied)
    }
}

/// Creator, assignee, the admin and anyone above either of them.
async fn can_view(store: &DataStore, ctx: &RequestContext, todo: &Todo) -> Result<bool, TodoError> {
    if ctx.is_admin() || todo.creator_id == ctx.actor.id || todo.assignee_id == ctx.actor.id {
        return Ok(true);
    }
    for owner_id in [&todo.creator_id, &todo.assignee_id] {
        if let Some(owner) = store.users.load(owner_id).await? {
            if permissions::is_superior_of(&store.users, &ctx.actor, &owner).await? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

pub async fn create_todo(
    store: &DataStore,
    ctx: &RequestContext,
    new_todo: NewTodo,
) -> Result<Todo, TodoError> {
    require(store, ctx, Action::TodoCreate, None).await?;
    if new_todo.title.trim().is_empty() {
        return Err(TodoError::Validation("title is required".to_string()));
    }

    let assignee_id = new_todo
        .assignee_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ctx.actor.id.clone());
    if assignee_id != ctx.actor.id {
        if store.users.load(&assignee_id).await?.is_none() {
            return Err(TodoError::Validation(format!(
                "assignee {assignee_id} does not exist"
            )));
        }
        require(store, ctx, Action::TodoAssign, Some(&assignee_id)).await?;
    }

    let todo = Todo::new(
        new_todo.title,
        new_todo.description,
        ctx.actor.id.clone(),
        assignee_id,
        new_todo.priority,
        new_todo.due_date,
    );
    store.todos.save(&todo).await?;
    info!(
        creator = %todo.creator_id,
        assignee = %todo.assignee_id,
        todo = %todo.id,
        "created todo"
    );

    if todo.assignee_id != todo.creator_id {
        let content = format!("{} assigned you \"{}\"", ctx.actor.name, todo.title);
        if let Err(err) =
            notifications::notify_todo(store, &todo.assignee_id, &todo.id, "New todo", &content)
                .await
        {
            warn!(todo = %todo.id, error = %err, "failed to notify assignee");
        }
    }
    Ok(todo)
}

pub async fn get_todo(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<Todo, TodoError> {
    let todo = load_todo(store, id).await?;
    if can_view(store, ctx, &todo).await? {
        Ok(todo)
    } else {
        Err(TodoError::PermissionDenied)
    }
}

/// Moves a todo between states. Entering `completed` stamps `completed_at`
/// once; leaving it clears the stamp. Setting the current status again
/// changes nothing.
///
/// The assignee needs `todo_check`; the creator may use `todo_manage`
/// instead.
pub async fn update_status(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
    status: TodoStatus,
) -> Result<Todo, TodoError> {
    let mut todo = load_todo(store, id).await?;
    if todo.creator_id != ctx.actor.id && todo.assignee_id != ctx.actor.id {
        return Err(TodoError::PermissionDenied);
    }
    let manages_own = todo.creator_id == ctx.actor.id
        && permissions::check(&store.users, &ctx.actor, Action::TodoCreate, None).await?;
    if !manages_own {
        require(store, ctx, Action::TodoCheck, None).await?;
    }
    if todo.status == status {
        return Ok(todo);
    }

    match status {
        TodoStatus::Completed => {
            if todo.completed_at.is_none() {
                todo.completed_at = Some(now());
            }
        }
        TodoStatus::Pending | TodoStatus::InProgress => todo.completed_at = None,
    }
    let previous = todo.status;
    todo.status = status;
    todo.updated_at = now();
    store.todos.save(&todo).await?;
    info!(
        actor = %ctx.actor.id,
        todo = %todo.id,
        from = previous.as_str(),
        to = status.as_str(),
        "updated todo status"
    );
    Ok(todo)
}

pub async fn reassign(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
    assignee_id: &str,
) -> Result<Todo, TodoError> {
    let mut todo = load_todo(store, id).await?;
    if todo.creator_id != ctx.actor.id {
        return Err(TodoError::PermissionDenied);
    }
    if assignee_id != ctx.actor.id {
        if store.users.load(assignee_id).await?.is_none() {
            return Err(TodoError::Validation(format!(
                "assignee {assignee_id} does not exist"
            )));
        }
        require(store, ctx, Action::TodoAssign, Some(assignee_id)).await?;
    }
    if todo.assignee_id == assignee_id {
        return Ok(todo);
    }

    todo.assignee_id = assignee_id.to_string();
    todo.updated_at = now();
    store.todos.save(&todo).await?;
    info!(actor = %ctx.actor.id, todo = %todo.id, assignee = %assignee_id, "reassigned todo");

    if todo.assignee_id != ctx.actor.id {
        let content = format!("{} assigned you \"{}\"", ctx.actor.name, todo.title);
        if let Err(err) =
            notifications::notify_todo(store, &todo.assignee_id, &todo.id, "New todo", &content)
                .await
        {
            warn!(todo = %todo.id, error = %err, "failed to notify assignee");
        }
    }
    Ok(todo)
}

pub async fn delete_todo(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<(), TodoError> {
    let todo = load_todo(store, id).await?;
    if todo.creator_id != ctx.actor.id {
        return Err(TodoError::PermissionDenied);
    }
    store.todos.delete(&todo.id).await?;
    info!(actor = %ctx.actor.id, todo = %todo.id, "deleted todo");
    Ok(())
}

/// Todos the actor created or is assigned, plus those created by anyone
/// below the actor when `include_subordinates` is set. Newest first, no
/// duplicates.
pub async fn todos_for_user(
    store: &DataStore,
    ctx: &RequestContext,
    include_subordinates: bool,
) -> Result<Vec<Todo>, TodoError> {
    let mut creators = vec![ctx.actor.id.clone()];
    if include_subordinates {
        let below = permissions::subordinate_ids(&store.users, &ctx.actor, true).await?;
        creators.extend(below);
    }

    let mut found: HashMap<String, Todo> = HashMap::new();
    for creator_id in &creators {
        for todo in store.todos.find_by_key(&format!("creator:{creator_id}")).await? {
            found.insert(todo.id.clone(), todo);
        }
    }
    for todo in store
        .todos
        .find_by_key(&format!("assignee:{}", ctx.actor.id))
        .await?
    {
        found.insert(todo.id.clone(), todo);
    }

    let mut todos: Vec<Todo> = found.into_values().collect();
    todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(todos)
}

pub async fn pending_todos_for_user(
    store: &DataStore,
    ctx: &RequestContext,
) -> Result<Vec<Todo>, TodoError> {
    Ok(todos_for_user(store, ctx, false)
        .await?
        .into_iter()
        .filter(|todo| todo.status == TodoStatus::Pending)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{Capability, User, ADMIN_USERNAME};
    use tempfile::TempDir;

    struct Staff {
        _dir: TempDir,
        store: DataStore,
        admin: RequestContext,
        boss: RequestContext,
        worker: RequestContext,
        outsider: RequestContext,
    }

    fn user(username: &str, permissions: Vec<Capability>) -> User {
        User::new(
            username.to_uppercase(),
            format!("E-{username}"),
            username.to_string(),
            String::new(),
            "Staff".to_string(),
            permissions,
        )
    }

    /// admin -> boss -> worker, admin -> outsider
    async fn staff() -> Staff {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path()).await.unwrap();

        let mut admin = user(ADMIN_USERNAME, vec![]);
        let mut boss = user("boss", vec![Capability::TodoManage, Capability::TodoCheck]);
        let mut worker = user("worker", vec![Capability::TodoCheck]);
        let mut outsider = user("outsider", vec![Capability::TodoManage, Capability::TodoCheck]);

        boss.parent_id = Some(admin.id.clone());
        outsider.parent_id = Some(admin.id.clone());
        worker.parent_id = Some(boss.id.clone());
        admin.subordinates = vec![boss.id.clone(), outsider.id.clone()];
        boss.subordinates = vec![worker.id.clone()];
        for u in [&admin, &boss, &worker, &outsider] {
            store.users.save(u).await.unwrap();
        }

        Staff {
            _dir: dir,
            store,
            admin: RequestContext::new(admin),
            boss: RequestContext::new(boss),
            worker: RequestContext::new(worker),
            outsider: RequestContext::new(outsider),
        }
    }

    fn new_todo(title: &str, assignee: Option<&str>) -> NewTodo {
        NewTodo {
            title: title.to_string(),
            description: String::new(),
            assignee_id: assignee.map(str::to_string),
            priority: TodoPriority::High,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn test_todo_lifecycle() {
        let s = staff().await;
        let todo = create_todo(&s.store, &s.boss, new_todo("Ship it", Some(s.worker.actor_id())))
            .await
            .unwrap();
        assert_eq!(todo.status, TodoStatus::Pending);

        let notes = notifications::notifications_for_user(&s.store, &s.worker, false)
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].related_id.as_deref(), Some(todo.id.as_str()));

        let started = update_status(&s.store, &s.worker, &todo.id, TodoStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(started.status, TodoStatus::InProgress);
        assert!(started.completed_at.is_none());

        let done = update_status(&s.store, &s.worker, &todo.id, TodoStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.status, TodoStatus::Completed);
        assert!(done.completed_at.is_some());

        let again = update_status(&s.store, &s.worker, &todo.id, TodoStatus::Completed)
            .await
            .unwrap();
        assert_eq!(again, done);

        let reopened = update_status(&s.store, &s.boss, &todo.id, TodoStatus::Pending)
            .await
            .unwrap();
        assert!(reopened.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_assigning_requires_reach() {
        let s = staff().await;

        let sideways = create_todo(
            &s.store,
            &s.outsider,
            new_todo("Nope", Some(s.worker.actor_id())),
        )
        .await;
        assert!(matches!(sideways, Err(TodoError::PermissionDenied)));

        let no_capability = create_todo(&s.store, &s.worker, new_todo("Self", None)).await;
        assert!(matches!(no_capability, Err(TodoError::PermissionDenied)));

        let blank = create_todo(&s.store, &s.boss, new_todo("  ", None)).await;
        assert!(matches!(blank, Err(TodoError::Validation(_))));

        let ghost = create_todo(&s.store, &s.boss, new_todo("Ghost", Some("user_ghost"))).await;
        assert!(matches!(ghost, Err(TodoError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unrelated_user_is_denied() {
        let s = staff().await;
        let todo = create_todo(&s.store, &s.boss, new_todo("Private", Some(s.worker.actor_id())))
            .await
            .unwrap();

        assert!(matches!(
            get_todo(&s.store, &s.outsider, &todo.id).await,
            Err(TodoError::PermissionDenied)
        ));
        assert!(matches!(
            update_status(&s.store, &s.outsider, &todo.id, TodoStatus::Completed).await,
            Err(TodoError::PermissionDenied)
        ));
        assert!(get_todo(&s.store, &s.admin, &todo.id).await.is_ok());
        assert!(get_todo(&s.store, &s.worker, &todo.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_superior_sees_subordinate_todos() {
        let s = staff().await;
        let own = create_todo(&s.store, &s.admin, new_todo("For worker", Some(s.worker.actor_id())))
            .await
            .unwrap();
        let by_boss = create_todo(&s.store, &s.boss, new_todo("From boss", None))
            .await
            .unwrap();

        assert!(get_todo(&s.store, &s.boss, &own.id).await.is_ok());

        let admin_direct = todos_for_user(&s.store, &s.admin, false).await.unwrap();
        assert_eq!(admin_direct.len(), 1);
        let admin_all = todos_for_user(&s.store, &s.admin, true).await.unwrap();
        assert_eq!(admin_all.len(), 2);
        assert_eq!(admin_all[0].id, by_boss.id, "newest first");

        let worker_pending = pending_todos_for_user(&s.store, &s.worker).await.unwrap();
        assert_eq!(worker_pending.len(), 1);
    }

    #[tokio::test]
    async fn test_only_creator_reassigns_and_deletes() {
        let s = staff().await;
        let todo = create_todo(&s.store, &s.boss, new_todo("Move me", None))
            .await
            .unwrap();

        assert!(matches!(
            reassign(&s.store, &s.worker, &todo.id, s.worker.actor_id()).await,
            Err(TodoError::PermissionDenied)
        ));
        let moved = reassign(&s.store, &s.boss, &todo.id, s.worker.actor_id())
            .await
            .unwrap();
        assert_eq!(moved.assignee_id, s.worker.actor.id);
        assert_eq!(
            s.store
                .todos
                .find_by_key(&format!("assignee:{}", s.worker.actor_id()))
                .await
                .unwrap()
                .len(),
            1
        );

        assert!(matches!(
            delete_todo(&s.store, &s.worker, &todo.id).await,
            Err(TodoError::PermissionDenied)
        ));
        delete_todo(&s.store, &s.boss, &todo.id).await.unwrap();
        assert!(matches!(
            get_todo(&s.store, &s.boss, &todo.id).await,
            Err(TodoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_manager_completes_own_todo() {
        let s = staff().await;
        let mut lead = user("lead", vec![Capability::TodoManage]);
        lead.parent_id = Some(s.admin.actor.id.clone());
        s.store.users.save(&lead).await.unwrap();
        let lead = RequestContext::new(lead);

        let todo = create_todo(&s.store, &lead, new_todo("Plan the offsite", None))
            .await
            .unwrap();
        assert_eq!(todo.assignee_id, lead.actor.id);

        let started = update_status(&s.store, &lead, &todo.id, TodoStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(started.status, TodoStatus::InProgress);
        let done = update_status(&s.store, &lead, &todo.id, TodoStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.status, TodoStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(
            s.store.todos.load(&todo.id).await.unwrap().unwrap().status,
            TodoStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_assignee_without_check_cannot_move_status() {
        let s = staff().await;
        let mut helper = user("helper", vec![Capability::ChatSend]);
        helper.parent_id = Some(s.boss.actor.id.clone());
        s.store.users.save(&helper).await.unwrap();

        let todo = create_todo(&s.store, &s.boss, new_todo("Tidy up", Some(&helper.id)))
            .await
            .unwrap();
        let helper = RequestContext::new(helper);
        assert!(matches!(
            update_status(&s.store, &helper, &todo.id, TodoStatus::Completed).await,
            Err(TodoError::PermissionDenied)
        ));
    }
}
