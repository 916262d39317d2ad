use crate::context::RequestContext;
use crate::permissions::{self, Action};
use crate::store::{DataStore, StoreError};
use crate::tables::{now, Capability, User};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const PASSWORD_MIN_LENGTH: usize = 8;

lazy_static! {
    static ref UPPERCASE: Regex = Regex::new(r"[A-Z]").unwrap();
    static ref LOWERCASE: Regex = Regex::new(r"[a-z]").unwrap();
    static ref DIGIT: Regex = Regex::new(r"[0-9]").unwrap();
    static ref SPECIAL: Regex = Regex::new(r"[^A-Za-z0-9]").unwrap();
}

#[derive(Error, Debug)]
pub enum UserError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("user not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewUser {
    pub name: String,
    pub code: String,
    pub username: String,
    pub password: String,
    pub position: String,
    #[serde(default)]
    pub permissions: Vec<Capability>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserChanges {
    pub name: String,
    pub code: String,
    pub position: String,
    #[serde(default)]
    pub permissions: Option<Vec<Capability>>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

// * Passwords .................................................................

/// Every strength rule the password breaks. Empty means acceptable.
pub fn password_problems(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        problems.push(format!(
            "password must be at least {PASSWORD_MIN_LENGTH} characters long"
        ));
    }
    if !UPPERCASE.is_match(password) {
        problems.push("password must contain an uppercase letter".to_string());
    }
    if !LOWERCASE.is_match(password) {
        problems.push("password must contain a lowercase letter".to_string());
    }
    if !DIGIT.is_match(password) {
        problems.push("password must contain a digit".to_string());
    }
    if !SPECIAL.is_match(password) {
        problems.push("password must contain a special character".to_string());
    }
    problems
}

pub fn validate_password_strength(password: &str) -> Result<(), UserError> {
    let problems = password_problems(password);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(UserError::Validation(problems.join("; ")))
    }
}

/// Hashes on the blocking pool; bcrypt at a production cost takes hundreds
/// of milliseconds.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, UserError> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

/// False for a wrong password and for hashes that cannot be parsed, such as
/// the empty hash departments carry.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, tokio::task::JoinError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false)).await
}

// * Queries ...................................................................

/// A miss rebuilds the username index once, so accounts written by another
/// process (such as `cli init`) are still found.
pub async fn find_by_username(
    store: &DataStore,
    username: &str,
) -> Result<Option<User>, StoreError> {
    let key = format!("username:{username}");
    if let Some(user) = store.users.find_one_by_key(&key).await? {
        return Ok(Some(user));
    }
    store.users.invalidate_index().await;
    store.users.find_one_by_key(&key).await
}

async fn load_user(store: &DataStore, id: &str) -> Result<User, UserError> {
    store.users.load(id).await?.ok_or(UserError::NotFound)
}

async fn require(
    store: &DataStore,
    ctx: &RequestContext,
    action: Action,
    target: Option<&str>,
) -> Result<(), UserError> {
    if permissions::check(&store.users, &ctx.actor, action, target).await? {
        Ok(())
    } else {
        Err(UserError::PermissionDenied)
    }
}

pub async fn get_user(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<User, UserError> {
    if id != ctx.actor_id() {
        require(store, ctx, Action::UserView, None).await?;
    }
    load_user(store, id).await
}

pub async fn list_users(store: &DataStore, ctx: &RequestContext) -> Result<Vec<User>, UserError> {
    require(store, ctx, Action::UserView, None).await?;
    let mut users = store.users.list_all().await?;
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(users)
}

/// Users the actor may manage permissions for: everyone they can operate on
/// except themselves and the admin.
pub async fn manageable_users(
    store: &DataStore,
    ctx: &RequestContext,
) -> Result<Vec<User>, UserError> {
    require(store, ctx, Action::PermissionAssign, None).await?;
    let mut manageable = Vec::new();
    for user in store.users.list_all().await? {
        if user.id == ctx.actor.id || user.is_admin() {
            continue;
        }
        if permissions::can_operate(&store.users, &ctx.actor, &user).await? {
            manageable.push(user);
        }
    }
    Ok(manageable)
}

pub async fn subordinates(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
    recursive: bool,
) -> Result<Vec<User>, UserError> {
    let user = get_user(store, ctx, id).await?;
    Ok(permissions::get_subordinates(&store.users, &user, recursive).await?)
}

// * Mutations .................................................................

/// One-time setup: creates the admin account and marks the data root as
/// initialized.
pub async fn initialize(
    store: &DataStore,
    name: &str,
    password: &str,
    bcrypt_cost: u32,
) -> Result<User, UserError> {
    let mut state = store.system.load().await?;
    if state.initialized {
        return Err(UserError::Conflict(
            "system is already initialized".to_string(),
        ));
    }
    require_filled(&[("name", name), ("password", password)])?;
    validate_password_strength(password)?;

    let admin = User::new(
        name.to_string(),
        "ADMIN001".to_string(),
        crate::tables::ADMIN_USERNAME.to_string(),
        hash_password(password, bcrypt_cost).await?,
        "Administrator".to_string(),
        Capability::ALL.to_vec(),
    );
    store.users.save(&admin).await?;

    state.initialized = true;
    state.admin_created = true;
    state.init_time = Some(now());
    store.system.save(&state).await?;
    info!(admin = %admin.id, "initialized system");
    Ok(admin)
}

fn require_filled(fields: &[(&str, &str)]) -> Result<(), UserError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(UserError::Validation(format!(
            "required fields missing: {}",
            missing.join(", ")
        )))
    }
}

/// Saves `user` under `creator_id`, linking both sides of the relation.
async fn save_under(
    store: &DataStore,
    creator_id: &str,
    mut user: User,
) -> Result<User, UserError> {
    let mut creator = load_user(store, creator_id).await?;
    user.parent_id = Some(creator.id.clone());
    store.users.save(&user).await?;

    if !creator.subordinates.contains(&user.id) {
        creator.subordinates.push(user.id.clone());
    }
    creator.touch();
    store.users.save(&creator).await?;
    Ok(user)
}

pub async fn create_user(
    store: &DataStore,
    ctx: &RequestContext,
    new_user: NewUser,
    bcrypt_cost: u32,
) -> Result<User, UserError> {
    require(store, ctx, Action::UserCreate, None).await?;
    require_filled(&[
        ("name", &new_user.name),
        ("code", &new_user.code),
        ("username", &new_user.username),
        ("password", &new_user.password),
        ("position", &new_user.position),
    ])?;
    if find_by_username(store, &new_user.username).await?.is_some()
        || new_user.username == crate::tables::ADMIN_USERNAME
    {
        return Err(UserError::Conflict(format!(
            "username {} is already taken",
            new_user.username
        )));
    }
    if !permissions::can_assign(&ctx.actor, &new_user.permissions) {
        return Err(UserError::PermissionDenied);
    }
    validate_password_strength(&new_user.password)?;

    let user = User::new(
        new_user.name,
        new_user.code,
        new_user.username,
        hash_password(&new_user.password, bcrypt_cost).await?,
        new_user.position,
        new_user.permissions,
    );
    let user = save_under(store, ctx.actor_id(), user).await?;
    info!(creator = %ctx.actor.id, user = %user.id, username = %user.username, "created user");
    Ok(user)
}

/// Departments are non-login entries in the hierarchy used to group staff.
pub async fn create_department(
    store: &DataStore,
    ctx: &RequestContext,
    name: &str,
) -> Result<User, UserError> {
    require(store, ctx, Action::UserCreate, None).await?;
    require_filled(&[("name", name)])?;

    let prefix: String = name.chars().take(3).collect::<String>().to_uppercase();
    let code = format!("DEPT_{prefix}_{}", now().and_utc().timestamp());
    let username = format!("dept_{}", uuid::Uuid::new_v4().simple());
    let mut department = User::new(
        name.to_string(),
        code,
        username,
        String::new(),
        "Department".to_string(),
        Vec::new(),
    );
    department.is_department = true;

    let department = save_under(store, ctx.actor_id(), department).await?;
    info!(creator = %ctx.actor.id, department = %department.id, "created department");
    Ok(department)
}

pub async fn update_user(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
    changes: UserChanges,
    bcrypt_cost: u32,
) -> Result<User, UserError> {
    let mut target = load_user(store, id).await?;
    require(store, ctx, Action::UserEdit, Some(&target.id)).await?;
    require_filled(&[
        ("name", &changes.name),
        ("code", &changes.code),
        ("position", &changes.position),
    ])?;

    if let Some(capabilities) = &changes.permissions {
        if !permissions::can_assign(&ctx.actor, capabilities) {
            return Err(UserError::PermissionDenied);
        }
    }
    if let Some(password) = changes.password.as_deref().filter(|p| !p.is_empty()) {
        validate_password_strength(password)?;
        target.password_hash = hash_password(password, bcrypt_cost).await?;
    }
    if let Some(active) = changes.is_active {
        if !active && target.is_admin() {
            return Err(UserError::Validation(
                "the admin account cannot be deactivated".to_string(),
            ));
        }
        target.is_active = active;
    }

    target.name = changes.name;
    target.code = changes.code;
    target.position = changes.position;
    // The admin implicitly holds everything; its stored list is left alone.
    if let (Some(capabilities), false) = (changes.permissions, target.is_admin()) {
        target.permissions = capabilities;
    }
    target.touch();
    store.users.save(&target).await?;
    info!(editor = %ctx.actor.id, user = %target.id, "updated user");
    Ok(target)
}

/// Replaces the target's capability list. Subordinates keep whatever they
/// were granted earlier.
pub async fn update_permissions(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
    capabilities: Vec<Capability>,
) -> Result<User, UserError> {
    let mut target = load_user(store, id).await?;
    require(store, ctx, Action::PermissionAssign, Some(&target.id)).await?;
    if !permissions::can_assign(&ctx.actor, &capabilities) {
        return Err(UserError::PermissionDenied);
    }
    if target.is_admin() {
        return Err(UserError::Validation(
            "the admin account always holds every permission".to_string(),
        ));
    }

    target.permissions = capabilities;
    target.touch();
    store.users.save(&target).await?;
    info!(
        assigner = %ctx.actor.id,
        user = %target.id,
        permissions = ?target.permissions,
        "assigned permissions"
    );
    Ok(target)
}

/// Deletes the user's file and unlinks it from its parent. Records owned by
/// the user and its own subordinates are left untouched.
pub async fn delete_user(
    store: &DataStore,
    ctx: &RequestContext,
    id: &str,
) -> Result<(), UserError> {
    let target = load_user(store, id).await?;
    if target.is_admin() {
        return Err(UserError::Validation(
            "the admin account cannot be deleted".to_string(),
        ));
    }
    require(store, ctx, Action::UserDelete, Some(&target.id)).await?;

    store.users.delete(&target.id).await?;
    if let Some(parent_id) = &target.parent_id {
        if let Some(mut parent) = store.users.load(parent_id).await? {
            parent.subordinates.retain(|s| s != &target.id);
            parent.touch();
            store.users.save(&parent).await?;
        }
    }
    info!(actor = %ctx.actor.id, user = %target.id, "deleted user");
    Ok(())
}

/// Moves `child_id` under `parent_id`, or to the top level when `None`.
pub async fn attach_user(
    store: &DataStore,
    ctx: &RequestContext,
    child_id: &str,
    parent_id: Option<&str>,
) -> Result<User, UserError> {
    let mut child = load_user(store, child_id).await?;
    if child.is_admin() {
        return Err(UserError::Validation(
            "the admin account is always a root".to_string(),
        ));
    }
    require(store, ctx, Action::UserEdit, Some(&child.id)).await?;

    let new_parent = match parent_id {
        Some(parent_id) => {
            let parent = load_user(store, parent_id).await?;
            let reachable = parent.id == ctx.actor.id
                || permissions::can_operate(&store.users, &ctx.actor, &parent).await?;
            if !reachable {
                return Err(UserError::PermissionDenied);
            }
            if parent.id == child.id
                || permissions::is_superior_of(&store.users, &child, &parent).await?
            {
                return Err(UserError::Conflict(
                    "moving the user there would create a cycle".to_string(),
                ));
            }
            Some(parent)
        }
        None if ctx.is_admin() => None,
        None => return Err(UserError::PermissionDenied),
    };

    let old_parent_id = child.parent_id.clone();
    let new_parent_id = new_parent.as_ref().map(|p| p.id.clone());
    if old_parent_id == new_parent_id {
        return Ok(child);
    }

    if let Some(old_id) = &old_parent_id {
        if let Some(mut old_parent) = store.users.load(old_id).await? {
            old_parent.subordinates.retain(|s| s != &child.id);
            old_parent.touch();
            store.users.save(&old_parent).await?;
        }
    }
    if let Some(mut parent) = new_parent {
        if !parent.subordinates.contains(&child.id) {
            parent.subordinates.push(child.id.clone());
        }
        parent.touch();
        store.users.save(&parent).await?;
    }

    child.parent_id = new_parent_id;
    child.touch();
    store.users.save(&child).await?;
    info!(
        actor = %ctx.actor.id,
        user = %child.id,
        from = ?old_parent_id,
        to = ?child.parent_id,
        "moved user"
    );
    Ok(child)
}

/// Only the admin account changes its own password here; everyone else has
/// theirs reset by a superior through [`update_user`].
pub async fn change_password(
    store: &DataStore,
    ctx: &RequestContext,
    current_password: &str,
    new_password: &str,
    bcrypt_cost: u32,
) -> Result<(), UserError> {
    if !ctx.is_admin() {
        return Err(UserError::PermissionDenied);
    }
    require_filled(&[
        ("current_password", current_password),
        ("new_password", new_password),
    ])?;

    let mut user = load_user(store, ctx.actor_id()).await?;
    if !verify_password(current_password, &user.password_hash).await? {
        return Err(UserError::Validation(
            "current password is incorrect".to_string(),
        ));
    }
    validate_password_strength(new_password)?;

    user.password_hash = hash_password(new_password, bcrypt_cost).await?;
    user.touch();
    store.users.save(&user).await?;
    info!(user = %user.id, "changed admin password");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::ADMIN_USERNAME;
    use tempfile::TempDir;

    const COST: u32 = 4;
    const PASSWORD: &str = "Str0ng!pass";

    async fn setup() -> (TempDir, DataStore, RequestContext) {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path()).await.unwrap();
        let admin = User::new(
            "Root".into(),
            "ADMIN001".into(),
            ADMIN_USERNAME.into(),
            hash_password(PASSWORD, COST).await.unwrap(),
            "Administrator".into(),
            Capability::ALL.to_vec(),
        );
        store.users.save(&admin).await.unwrap();
        (dir, store, RequestContext::new(admin))
    }

    fn new_user(username: &str, permissions: Vec<Capability>) -> NewUser {
        NewUser {
            name: username.to_uppercase(),
            code: format!("E-{username}"),
            username: username.to_string(),
            password: PASSWORD.to_string(),
            position: "Engineer".to_string(),
            permissions,
        }
    }

    async fn reload(store: &DataStore, user: &User) -> User {
        store.users.load(&user.id).await.unwrap().unwrap()
    }

    #[test]
    fn test_password_strength_reports_every_problem() {
        assert!(password_problems(PASSWORD).is_empty());
        assert_eq!(password_problems("abc").len(), 4);
        assert_eq!(password_problems("abcdefgh1!").len(), 1);
        assert!(validate_password_strength("NoDigits!!").is_err());
    }

    #[tokio::test]
    async fn test_verify_password_rejects_empty_hash() {
        let hash = hash_password(PASSWORD, COST).await.unwrap();
        assert!(verify_password(PASSWORD, &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
        assert!(!verify_password(PASSWORD, "").await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_hashing_leaves_the_runtime_free() {
        // On a single-threaded runtime the ticker only runs if hashing yields.
        let ticker = tokio::spawn(async { "ticked" });
        let hash = hash_password(PASSWORD, 8).await.unwrap();
        assert!(ticker.is_finished());
        assert!(hash.starts_with("$2"));
        assert_eq!(ticker.await.unwrap(), "ticked");
    }

    #[tokio::test]
    async fn test_create_user_links_both_directions() {
        let (_dir, store, admin_ctx) = setup().await;

        let alice = create_user(
            &store,
            &admin_ctx,
            new_user("alice", vec![Capability::UserCreate]),
            COST,
        )
        .await
        .unwrap();
        assert_eq!(alice.parent_id.as_deref(), Some(admin_ctx.actor_id()));
        let admin = reload(&store, &admin_ctx.actor).await;
        assert_eq!(admin.subordinates, vec![alice.id.clone()]);

        let alice_ctx = RequestContext::new(alice.clone());
        let bob = create_user(&store, &alice_ctx, new_user("bob", vec![]), COST)
            .await
            .unwrap();
        assert!(permissions::is_superior_of(&store.users, &admin, &bob).await.unwrap());
        assert!(permissions::is_superior_of(&store.users, &alice, &bob).await.unwrap());
        assert!(!permissions::is_superior_of(&store.users, &bob, &alice).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_user_rules() {
        let (_dir, store, admin_ctx) = setup().await;
        create_user(&store, &admin_ctx, new_user("alice", vec![Capability::UserCreate]), COST)
            .await
            .unwrap();

        let duplicate = create_user(&store, &admin_ctx, new_user("alice", vec![]), COST).await;
        assert!(matches!(duplicate, Err(UserError::Conflict(_))));

        let reserved =
            create_user(&store, &admin_ctx, new_user(ADMIN_USERNAME, vec![]), COST).await;
        assert!(matches!(reserved, Err(UserError::Conflict(_))));

        let mut weak = new_user("weak", vec![]);
        weak.password = "password".to_string();
        assert!(matches!(
            create_user(&store, &admin_ctx, weak, COST).await,
            Err(UserError::Validation(_))
        ));

        let alice = find_by_username(&store, "alice").await.unwrap().unwrap();
        let alice_ctx = RequestContext::new(alice);
        let escalation = create_user(
            &store,
            &alice_ctx,
            new_user("carol", vec![Capability::SystemConfig]),
            COST,
        )
        .await;
        assert!(matches!(escalation, Err(UserError::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_user_without_capability_cannot_create() {
        let (_dir, store, admin_ctx) = setup().await;
        let plain = create_user(&store, &admin_ctx, new_user("plain", vec![]), COST)
            .await
            .unwrap();
        let result =
            create_user(&store, &RequestContext::new(plain), new_user("x", vec![]), COST).await;
        assert!(matches!(result, Err(UserError::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_update_permissions_is_bounded_by_assigner() {
        let (_dir, store, admin_ctx) = setup().await;
        let manager = create_user(
            &store,
            &admin_ctx,
            new_user(
                "manager",
                vec![Capability::UserCreate, Capability::PermissionAssign, Capability::TodoCheck],
            ),
            COST,
        )
        .await
        .unwrap();
        let manager_ctx = RequestContext::new(manager.clone());
        let worker = create_user(&store, &manager_ctx, new_user("worker", vec![]), COST)
            .await
            .unwrap();

        let updated =
            update_permissions(&store, &manager_ctx, &worker.id, vec![Capability::TodoCheck])
                .await
                .unwrap();
        assert_eq!(updated.permissions, vec![Capability::TodoCheck]);

        let too_much = update_permissions(
            &store,
            &manager_ctx,
            &worker.id,
            vec![Capability::SystemConfig],
        )
        .await;
        assert!(matches!(too_much, Err(UserError::PermissionDenied)));

        // Revoking the manager's capability leaves the worker's grant in place.
        update_permissions(&store, &admin_ctx, &manager.id, vec![Capability::PermissionAssign])
            .await
            .unwrap();
        let worker = reload(&store, &worker).await;
        assert_eq!(worker.permissions, vec![Capability::TodoCheck]);
    }

    #[tokio::test]
    async fn test_update_user_keeps_admin_permissions() {
        let (_dir, store, admin_ctx) = setup().await;
        let changes = UserChanges {
            name: "Root Renamed".into(),
            code: "ADMIN001".into(),
            position: "Administrator".into(),
            permissions: Some(vec![]),
            password: None,
            is_active: None,
        };
        let admin = update_user(&store, &admin_ctx, admin_ctx.actor_id(), changes, COST)
            .await
            .unwrap();
        assert_eq!(admin.name, "Root Renamed");
        assert_eq!(admin.permissions.len(), Capability::ALL.len());

        let deactivate = UserChanges {
            name: "Root".into(),
            code: "ADMIN001".into(),
            position: "Administrator".into(),
            is_active: Some(false),
            ..UserChanges::default()
        };
        assert!(matches!(
            update_user(&store, &admin_ctx, admin_ctx.actor_id(), deactivate, COST).await,
            Err(UserError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_user_resets_password() {
        let (_dir, store, admin_ctx) = setup().await;
        let alice = create_user(&store, &admin_ctx, new_user("alice", vec![]), COST)
            .await
            .unwrap();
        let changes = UserChanges {
            name: alice.name.clone(),
            code: alice.code.clone(),
            position: alice.position.clone(),
            password: Some("N3w&Better".into()),
            ..UserChanges::default()
        };
        let updated = update_user(&store, &admin_ctx, &alice.id, changes, COST)
            .await
            .unwrap();
        assert!(verify_password("N3w&Better", &updated.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user_unlinks_parent_only() {
        let (_dir, store, admin_ctx) = setup().await;
        let alice = create_user(
            &store,
            &admin_ctx,
            new_user("alice", vec![Capability::UserCreate]),
            COST,
        )
        .await
        .unwrap();
        let bob = create_user(
            &store,
            &RequestContext::new(alice.clone()),
            new_user("bob", vec![]),
            COST,
        )
        .await
        .unwrap();

        delete_user(&store, &admin_ctx, &alice.id).await.unwrap();
        assert!(store.users.load(&alice.id).await.unwrap().is_none());
        let admin = reload(&store, &admin_ctx.actor).await;
        assert!(admin.subordinates.is_empty());
        // bob keeps the dangling parent pointer
        let bob = reload(&store, &bob).await;
        assert_eq!(bob.parent_id.as_deref(), Some(alice.id.as_str()));

        assert!(matches!(
            delete_user(&store, &admin_ctx, admin_ctx.actor_id()).await,
            Err(UserError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_attach_user_moves_and_rejects_cycles() {
        let (_dir, store, admin_ctx) = setup().await;
        let alice = create_user(
            &store,
            &admin_ctx,
            new_user("alice", vec![Capability::UserCreate]),
            COST,
        )
        .await
        .unwrap();
        let bob = create_user(
            &store,
            &RequestContext::new(alice.clone()),
            new_user("bob", vec![]),
            COST,
        )
        .await
        .unwrap();
        let carol = create_user(&store, &admin_ctx, new_user("carol", vec![]), COST)
            .await
            .unwrap();

        let moved = attach_user(&store, &admin_ctx, &carol.id, Some(&bob.id)).await.unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(bob.id.as_str()));
        assert_eq!(reload(&store, &bob).await.subordinates, vec![carol.id.clone()]);
        assert!(!reload(&store, &admin_ctx.actor).await.subordinates.contains(&carol.id));

        let cycle = attach_user(&store, &admin_ctx, &alice.id, Some(&carol.id)).await;
        assert!(matches!(cycle, Err(UserError::Conflict(_))));

        let to_root = attach_user(&store, &admin_ctx, &carol.id, None).await.unwrap();
        assert_eq!(to_root.parent_id, None);
        assert!(reload(&store, &bob).await.subordinates.is_empty());
    }

    #[tokio::test]
    async fn test_change_password_is_admin_only() {
        let (_dir, store, admin_ctx) = setup().await;
        let alice = create_user(&store, &admin_ctx, new_user("alice", vec![]), COST)
            .await
            .unwrap();

        let denied = change_password(
            &store,
            &RequestContext::new(alice),
            PASSWORD,
            "An0ther!one",
            COST,
        )
        .await;
        assert!(matches!(denied, Err(UserError::PermissionDenied)));

        let wrong = change_password(&store, &admin_ctx, "nope", "An0ther!one", COST).await;
        assert!(matches!(wrong, Err(UserError::Validation(_))));

        change_password(&store, &admin_ctx, PASSWORD, "An0ther!one", COST)
            .await
            .unwrap();
        let admin = reload(&store, &admin_ctx.actor).await;
        assert!(verify_password("An0ther!one", &admin.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path()).await.unwrap();

        let weak = initialize(&store, "Root", "short", COST).await;
        assert!(matches!(weak, Err(UserError::Validation(_))));
        assert!(!store.system.load().await.unwrap().initialized);

        let admin = initialize(&store, "Root", PASSWORD, COST).await.unwrap();
        assert!(admin.is_admin());
        assert_eq!(admin.code, "ADMIN001");
        assert_eq!(admin.parent_id, None);
        let state = store.system.load().await.unwrap();
        assert!(state.initialized && state.admin_created);

        let again = initialize(&store, "Root", PASSWORD, COST).await;
        assert!(matches!(again, Err(UserError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_departments_cannot_log_in() {
        let (_dir, store, admin_ctx) = setup().await;
        let dept = create_department(&store, &admin_ctx, "Engineering").await.unwrap();
        assert!(dept.is_department);
        assert!(dept.code.starts_with("DEPT_ENG_"));
        assert!(!verify_password("department", &dept.password_hash).await.unwrap());
        assert!(reload(&store, &admin_ctx.actor).await.subordinates.contains(&dept.id));
    }

    #[tokio::test]
    async fn test_manageable_users_excludes_self_and_admin() {
        let (_dir, store, admin_ctx) = setup().await;
        let alice = create_user(
            &store,
            &admin_ctx,
            new_user("alice", vec![Capability::UserCreate, Capability::PermissionAssign]),
            COST,
        )
        .await
        .unwrap();
        let alice_ctx = RequestContext::new(alice);
        let bob = create_user(&store, &alice_ctx, new_user("bob", vec![]), COST)
            .await
            .unwrap();
        create_user(&store, &admin_ctx, new_user("carol", vec![]), COST)
            .await
            .unwrap();

        let manageable = manageable_users(&store, &alice_ctx).await.unwrap();
        assert_eq!(manageable.iter().map(|u| u.id.clone()).collect::<Vec<_>>(), vec![bob.id]);
    }

    #[tokio::test]
    async fn test_username_lookup_sees_other_writers() {
        let (dir, store, _admin_ctx) = setup().await;
        assert!(find_by_username(&store, "late").await.unwrap().is_none());

        // A second handle on the same directory keeps its own index.
        let other = DataStore::open(dir.path()).await.unwrap();
        let late = User::new(
            "Late".into(),
            "E-late".into(),
            "late".into(),
            String::new(),
            "Staff".into(),
            vec![],
        );
        other.users.save(&late).await.unwrap();

        let found = find_by_username(&store, "late").await.unwrap().unwrap();
        assert_eq!(found.id, late.id);
    }
}
