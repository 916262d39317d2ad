use super::{fetch_json, segment, send, ApiClient, ClientError};
use super::{AttachChildRequest, PermissionResponse, UserResponse, UserTreeNode};
use crate::api::users::{CreateDepartmentRequest, UpdatePermissionsRequest};
use crate::tables::Capability;
use crate::users::{NewUser, UserChanges};
use crate::{PERMISSIONS_API, USERS_API};

impl ApiClient {
    pub async fn permissions(&self) -> Result<Vec<PermissionResponse>, ClientError> {
        fetch_json(self.get(PERMISSIONS_API), PERMISSIONS_API).await
    }

    pub async fn fetch_users(&self) -> Result<Vec<UserResponse>, ClientError> {
        fetch_json(self.get(USERS_API), "users").await
    }

    pub async fn fetch_user(&self, id: &str) -> Result<UserResponse, ClientError> {
        let path = format!("{USERS_API}/{}", segment(id));
        fetch_json(self.get(&path), &format!("user {id}")).await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<UserResponse, ClientError> {
        fetch_json(self.post(USERS_API).json(user), "users").await
    }

    pub async fn create_department(&self, name: &str) -> Result<UserResponse, ClientError> {
        let payload = CreateDepartmentRequest {
            name: name.to_string(),
        };
        fetch_json(
            self.post(&format!("{USERS_API}/departments")).json(&payload),
            "departments",
        )
        .await
    }

    pub async fn update_user(
        &self,
        id: &str,
        changes: &UserChanges,
    ) -> Result<UserResponse, ClientError> {
        let path = format!("{USERS_API}/{}", segment(id));
        fetch_json(self.put(&path).json(changes), &format!("user {id}")).await
    }

    pub async fn update_permissions(
        &self,
        id: &str,
        permissions: Vec<Capability>,
    ) -> Result<UserResponse, ClientError> {
        let path = format!("{USERS_API}/{}/permissions", segment(id));
        let payload = UpdatePermissionsRequest { permissions };
        fetch_json(self.put(&path).json(&payload), &format!("user {id}")).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("{USERS_API}/{}", segment(id));
        send(self.delete(&path), &format!("user {id}")).await?;
        Ok(())
    }

    pub async fn fetch_subordinates(
        &self,
        id: &str,
        recursive: bool,
    ) -> Result<Vec<UserResponse>, ClientError> {
        let path = format!("{USERS_API}/{}/subordinates", segment(id));
        fetch_json(
            self.get(&path).query(&[("recursive", recursive)]),
            &format!("user {id}"),
        )
        .await
    }

    // ** Hierarchy ...........................................................

    pub async fn fetch_user_tree(&self) -> Result<Vec<UserTreeNode>, ClientError> {
        fetch_json(self.get(&format!("{USERS_API}/tree")), "user tree").await
    }

    pub async fn attach_user(&self, payload: &AttachChildRequest) -> Result<(), ClientError> {
        send(
            self.post(&format!("{USERS_API}/hierarchy/attach"))
                .json(payload),
            &format!("user {}", payload.child_id),
        )
        .await?;
        Ok(())
    }

    pub async fn detach_user(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("{USERS_API}/hierarchy/detach/{}", segment(id));
        send(self.delete(&path), &format!("user {id}")).await?;
        Ok(())
    }
}
