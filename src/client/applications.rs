use super::{fetch_json, segment, send, ApiClient, ClientError};
use crate::api::applications::RejectRequest;
use crate::applications::NewApplication;
use crate::tables::Application;
use crate::APPLICATIONS_API;

impl ApiClient {
    pub async fn fetch_applications(&self) -> Result<Vec<Application>, ClientError> {
        fetch_json(self.get(APPLICATIONS_API), "applications").await
    }

    pub async fn fetch_pending_applications(&self) -> Result<Vec<Application>, ClientError> {
        fetch_json(
            self.get(&format!("{APPLICATIONS_API}/pending")),
            "applications",
        )
        .await
    }

    pub async fn create_application(
        &self,
        application: &NewApplication,
    ) -> Result<Application, ClientError> {
        fetch_json(
            self.post(APPLICATIONS_API).json(application),
            "applications",
        )
        .await
    }

    pub async fn approve_application(&self, id: &str) -> Result<Application, ClientError> {
        let path = format!("{APPLICATIONS_API}/{}/approve", segment(id));
        fetch_json(self.put(&path), &format!("application {id}")).await
    }

    pub async fn reject_application(
        &self,
        id: &str,
        reason: Option<String>,
    ) -> Result<Application, ClientError> {
        let path = format!("{APPLICATIONS_API}/{}/reject", segment(id));
        fetch_json(
            self.put(&path).json(&RejectRequest { reason }),
            &format!("application {id}"),
        )
        .await
    }

    pub async fn delete_application(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("{APPLICATIONS_API}/{}", segment(id));
        send(self.delete(&path), &format!("application {id}")).await?;
        Ok(())
    }
}
