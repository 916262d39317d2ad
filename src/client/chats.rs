use super::{fetch_json, segment, send, ApiClient, ClientError};
use crate::api::chats::{GroupChatRequest, PrivateChatRequest, SendMessageRequest};
use crate::chats::{ChatSummary, NewAttachment};
use crate::tables::{Chat, Message};
use crate::CHATS_API;

impl ApiClient {
    pub async fn fetch_chats(&self) -> Result<Vec<ChatSummary>, ClientError> {
        fetch_json(self.get(CHATS_API), "chats").await
    }

    pub async fn open_private_chat(&self, user_id: &str) -> Result<Chat, ClientError> {
        let payload = PrivateChatRequest {
            user_id: user_id.to_string(),
        };
        fetch_json(
            self.post(&format!("{CHATS_API}/private")).json(&payload),
            &format!("user {user_id}"),
        )
        .await
    }

    pub async fn create_group_chat(
        &self,
        name: &str,
        participants: Vec<String>,
    ) -> Result<Chat, ClientError> {
        let payload = GroupChatRequest {
            name: name.to_string(),
            participants,
        };
        fetch_json(
            self.post(&format!("{CHATS_API}/group")).json(&payload),
            "chats",
        )
        .await
    }

    pub async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, ClientError> {
        let path = format!("{CHATS_API}/{}/messages", segment(chat_id));
        fetch_json(
            self.get(&path).query(&[("limit", limit), ("offset", offset)]),
            &format!("chat {chat_id}"),
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        attachments: Vec<NewAttachment>,
    ) -> Result<Message, ClientError> {
        let path = format!("{CHATS_API}/{}/messages", segment(chat_id));
        let payload = SendMessageRequest {
            content: content.to_string(),
            attachments,
        };
        fetch_json(self.post(&path).json(&payload), &format!("chat {chat_id}")).await
    }

    pub async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), ClientError> {
        let path = format!(
            "{CHATS_API}/{}/messages/{}",
            segment(chat_id),
            segment(message_id)
        );
        send(self.delete(&path), &format!("message {message_id}")).await?;
        Ok(())
    }
}
