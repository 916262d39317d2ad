//! Permission evaluation over the user forest.
//!
//! Three inputs decide whether an actor may do something: the admin
//! sentinel, the actor's capability list and the actor's position above the
//! target in the superior/subordinate forest.

use crate::store::{JsonStore, StoreError};
use crate::tables::{Capability, User};
use std::collections::{HashSet, VecDeque};
use tracing::warn;

/// Upper bound on ancestor walks. A longer chain is treated as corrupt.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    UserCreate,
    UserEdit,
    UserDelete,
    UserView,
    TodoCreate,
    TodoAssign,
    TodoCheck,
    MessageSend,
    MessageDelete,
    ApplicationCreate,
    ApplicationDelete,
    PermissionAssign,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::UserCreate => "user_create",
            Action::UserEdit => "user_edit",
            Action::UserDelete => "user_delete",
            Action::UserView => "user_view",
            Action::TodoCreate => "todo_create",
            Action::TodoAssign => "todo_assign",
            Action::TodoCheck => "todo_check",
            Action::MessageSend => "message_send",
            Action::MessageDelete => "message_delete",
            Action::ApplicationCreate => "application_create",
            Action::ApplicationDelete => "application_delete",
            Action::PermissionAssign => "permission_assign",
        }
    }

    pub fn capability(self) -> Capability {
        match self {
            Action::UserCreate => Capability::UserCreate,
            Action::UserEdit => Capability::UserEdit,
            Action::UserDelete => Capability::UserDelete,
            Action::UserView => Capability::UserView,
            Action::TodoCreate | Action::TodoAssign => Capability::TodoManage,
            Action::TodoCheck => Capability::TodoCheck,
            Action::MessageSend => Capability::ChatSend,
            Action::MessageDelete => Capability::ChatDelete,
            Action::ApplicationCreate => Capability::ApplicationCreate,
            Action::ApplicationDelete => Capability::ApplicationDelete,
            Action::PermissionAssign => Capability::PermissionAssign,
        }
    }

    /// Actions a user may direct at themselves.
    pub fn allows_self(self) -> bool {
        matches!(
            self,
            Action::TodoCheck | Action::MessageSend | Action::ApplicationCreate
        )
    }
}

pub fn has_permission(user: &User, capability: Capability) -> bool {
    user.is_admin() || user.permissions.contains(&capability)
}

/// True when the actor already holds every capability in `capabilities`.
pub fn can_assign(actor: &User, capabilities: &[Capability]) -> bool {
    capabilities.iter().all(|cap| has_permission(actor, *cap))
}

/// Walks `target`'s ancestors looking for `superior`.
///
/// Stops at a root, at a dangling `parent_id`, at a repeated id or after
/// [`MAX_HIERARCHY_DEPTH`] steps.
pub async fn is_superior_of(
    users: &JsonStore<User>,
    superior: &User,
    target: &User,
) -> Result<bool, StoreError> {
    let mut visited = HashSet::from([target.id.clone()]);
    let mut current = target.parent_id.clone();
    let mut depth = 0;

    while let Some(parent_id) = current {
        if parent_id == superior.id {
            return Ok(true);
        }
        depth += 1;
        if depth >= MAX_HIERARCHY_DEPTH || !visited.insert(parent_id.clone()) {
            warn!(
                target_user = %target.id,
                parent_id = %parent_id,
                depth,
                "user hierarchy contains a cycle or is too deep"
            );
            return Ok(false);
        }
        current = users
            .load(&parent_id)
            .await?
            .and_then(|parent| parent.parent_id);
    }
    Ok(false)
}

pub async fn can_operate(
    users: &JsonStore<User>,
    actor: &User,
    target: &User,
) -> Result<bool, StoreError> {
    if actor.is_admin() {
        return Ok(true);
    }
    if actor.id == target.id {
        return Ok(false);
    }
    is_superior_of(users, actor, target).await
}

/// Direct subordinates, plus all transitive ones when `recursive`.
///
/// Breadth-first; each user is loaded at most once and ids that no longer
/// resolve are skipped.
pub async fn get_subordinates(
    users: &JsonStore<User>,
    user: &User,
    recursive: bool,
) -> Result<Vec<User>, StoreError> {
    let mut visited = HashSet::from([user.id.clone()]);
    let mut queue: VecDeque<String> = user.subordinates.iter().cloned().collect();
    let mut found = Vec::new();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(subordinate) = users.load(&id).await? else {
            continue;
        };
        if recursive {
            queue.extend(subordinate.subordinates.iter().cloned());
        }
        found.push(subordinate);
    }
    Ok(found)
}

pub async fn subordinate_ids(
    users: &JsonStore<User>,
    user: &User,
    recursive: bool,
) -> Result<HashSet<String>, StoreError> {
    Ok(get_subordinates(users, user, recursive)
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect())
}

/// Decides whether `actor` may perform `action`, optionally against a target
/// user.
pub async fn can_perform(
    users: &JsonStore<User>,
    actor: &User,
    action: Action,
    target_id: Option<&str>,
) -> Result<bool, StoreError> {
    if actor.is_admin() {
        return Ok(true);
    }
    if !has_permission(actor, action.capability()) {
        return Ok(false);
    }
    let Some(target_id) = target_id else {
        return Ok(true);
    };
    let Some(target) = users.load(target_id).await? else {
        return Ok(false);
    };

    if target.id == actor.id {
        if !action.allows_self() {
            return Ok(false);
        }
    } else if !can_operate(users, actor, &target).await? {
        return Ok(false);
    }

    if action == Action::PermissionAssign && !can_assign(actor, &target.permissions) {
        return Ok(false);
    }
    Ok(true)
}

/// [`can_perform`], logging denials.
pub async fn check(
    users: &JsonStore<User>,
    actor: &User,
    action: Action,
    target_id: Option<&str>,
) -> Result<bool, StoreError> {
    let allowed = can_perform(users, actor, action, target_id).await?;
    if !allowed {
        warn!(
            actor = %actor.id,
            action = action.as_str(),
            target = target_id.unwrap_or("-"),
            "action denied"
        );
    }
    Ok(allowed)
}
