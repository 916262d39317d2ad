use super::generics::{build_generic_tree, BasicTreeNode};
use crate::api::state::AppState;
use crate::context::RequestContext;
use crate::tables::User;
use crate::users::{self, UserError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::response::ErasedJson;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UserTreeNode {
    pub id: String,
    pub name: String,
    pub username: String,
    pub position: String,
    pub is_department: bool,
    pub children: Vec<UserTreeNode>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AttachChildRequest {
    pub child_id: String,
    pub parent_id: Option<String>,
}

fn convert_to_user_tree(basic_node: BasicTreeNode<User>) -> UserTreeNode {
    UserTreeNode {
        id: basic_node.id,
        name: basic_node.data.name,
        username: basic_node.data.username,
        position: basic_node.data.position,
        is_department: basic_node.data.is_department,
        children: basic_node
            .children
            .into_iter()
            .map(convert_to_user_tree)
            .collect(),
    }
}

/// The user forest. Users without a (resolvable) parent are roots.
pub fn build_user_tree(all_users: Vec<User>) -> Vec<UserTreeNode> {
    let hierarchy_tuples: Vec<(String, String)> = all_users
        .iter()
        .filter_map(|u| u.parent_id.clone().map(|parent| (u.id.clone(), parent)))
        .collect();
    let user_data: Vec<(String, User)> = all_users.into_iter().map(|u| (u.id.clone(), u)).collect();

    build_generic_tree(&user_data, &hierarchy_tuples)
        .into_iter()
        .map(convert_to_user_tree)
        .collect()
}

pub async fn get_user_tree(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<ErasedJson, UserError> {
    let all_users = users::list_users(&state.store, &ctx).await?;
    Ok(ErasedJson::pretty(build_user_tree(all_users)))
}

pub async fn attach_child_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<AttachChildRequest>,
) -> Result<StatusCode, UserError> {
    users::attach_user(
        &state.store,
        &ctx,
        &payload.child_id,
        payload.parent_id.as_deref(),
    )
    .await?;
    Ok(StatusCode::OK)
}

pub async fn detach_child_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(child_id): Path<String>,
) -> Result<StatusCode, UserError> {
    users::attach_user(&state.store, &ctx, &child_id, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str) -> User {
        User::new(
            username.into(),
            username.into(),
            username.into(),
            String::new(),
            "Staff".into(),
            vec![],
        )
    }

    #[test]
    fn test_user_tree_follows_parent_ids() {
        let root = user("admin");
        let mut lead = user("lead");
        let mut dev = user("dev");
        let mut orphan = user("orphan");
        lead.parent_id = Some(root.id.clone());
        dev.parent_id = Some(lead.id.clone());
        orphan.parent_id = Some("user_deleted".into());

        let tree = build_user_tree(vec![root.clone(), lead.clone(), dev.clone(), orphan.clone()]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, root.id);
        assert_eq!(tree[0].children[0].username, "lead");
        assert_eq!(tree[0].children[0].children[0].username, "dev");
        assert_eq!(tree[1].id, orphan.id);
    }
}
