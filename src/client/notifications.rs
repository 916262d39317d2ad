use super::{fetch_json, segment, send, ApiClient, ClientError};
use crate::api::notifications::CountResponse;
use crate::tables::Notification;
use crate::NOTIFICATIONS_API;

impl ApiClient {
    pub async fn fetch_notifications(
        &self,
        unread_only: bool,
    ) -> Result<Vec<Notification>, ClientError> {
        fetch_json(
            self.get(NOTIFICATIONS_API)
                .query(&[("unread_only", unread_only)]),
            "notifications",
        )
        .await
    }

    pub async fn unread_count(&self) -> Result<usize, ClientError> {
        let count: CountResponse = fetch_json(
            self.get(&format!("{NOTIFICATIONS_API}/unread_count")),
            "notifications",
        )
        .await?;
        Ok(count.count)
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<Notification, ClientError> {
        let path = format!("{NOTIFICATIONS_API}/{}/read", segment(id));
        fetch_json(self.put(&path), &format!("notification {id}")).await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<usize, ClientError> {
        let count: CountResponse = fetch_json(
            self.put(&format!("{NOTIFICATIONS_API}/read_all")),
            "notifications",
        )
        .await?;
        Ok(count.count)
    }

    pub async fn delete_notification(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("{NOTIFICATIONS_API}/{}", segment(id));
        send(self.delete(&path), &format!("notification {id}")).await?;
        Ok(())
    }
}
