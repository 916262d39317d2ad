//! Private and group conversations.
//!
//! A chat's metadata and its messages live side by side in the chats
//! directory; see [`crate::schema::chats`]. Private chats are unique per
//! pair of users and are found through the pair index key regardless of
//! who opened them first.

use crate::context::RequestContext;
use crate::notifications;
use crate::permissions::{self, Action};
use crate::schema;
use crate::store::{DataStore, Entity, StoreError};
use crate::tables::{private_pair_key, Attachment, Capability, Chat, ChatKind, Message};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("chat not found")]
    NotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Validation(String),
}

/// An attachment as supplied by the sender. The mime type is guessed from
/// the file name when omitted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewAttachment {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, rename = "type")]
    pub mime_type: Option<String>,
}

impl From<NewAttachment> for Attachment {
    fn from(new: NewAttachment) -> Self {
        let name = sanitize_filename::sanitize(&new.name);
        let mime_type = new
            .mime_type
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| mime_guess::from_path(&name).first_or_octet_stream().to_string());
        Attachment {
            name,
            path: new.path,
            size: new.size,
            mime_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub last_message: Option<Message>,
}

async fn load_chat(store: &DataStore, id: &str) -> Result<Chat, ChatError> {
    store
        .chats
        .load(&format!("{id}{}", schema::chats::INFO_SUFFIX))
        .await?
        .ok_or(ChatError::NotFound)
}

fn require_participant(ctx: &RequestContext, chat: &Chat) -> Result<(), ChatError> {
    if chat.has_participant(&ctx.actor.id) {
        Ok(())
    } else {
        warn!(actor = %ctx.actor.id, chat = %chat.id, "not a participant");
        Err(ChatError::PermissionDenied)
    }
}

/// Group management needs membership and the `chat_group` capability.
fn require_group_member(ctx: &RequestContext, chat: &Chat) -> Result<(), ChatError> {
    if chat.kind != ChatKind::Group {
        return Err(ChatError::Validation(
            "only group chats can be changed".to_string(),
        ));
    }
    require_participant(ctx, chat)?;
    if !ctx.has(Capability::ChatGroup) {
        return Err(ChatError::PermissionDenied);
    }
    Ok(())
}

/// The private chat between `a` and `b`, created on first use.
pub async fn get_or_create_private_chat(
    store: &DataStore,
    a: &str,
    b: &str,
) -> Result<Chat, StoreError> {
    if let Some(chat) = store.chats.find_one_by_key(&private_pair_key(a, b)).await? {
        return Ok(chat);
    }
    let chat = Chat::new(ChatKind::Private, vec![a.to_string(), b.to_string()], None);
    store.chats.save(&chat).await?;
    info!(chat = %chat.id, a = %a, b = %b, "created private chat");
    Ok(chat)
}

pub async fn open_private_chat(
    store: &DataStore,
    ctx: &RequestContext,
    target_id: &str,
) -> Result<Chat, ChatError> {
    if !permissions::check(&store.users, &ctx.actor, Action::MessageSend, None).await? {
        return Err(ChatError::PermissionDenied);
    }
    if target_id == ctx.actor.id {
        return Err(ChatError::Validation(
            "cannot open a private chat with yourself".to_string(),
        ));
    }
    if store.users.load(target_id).await?.is_none() {
        return Err(ChatError::UserNotFound);
    }
    Ok(get_or_create_private_chat(store, &ctx.actor.id, target_id).await?)
}

pub async fn create_group_chat(
    store: &DataStore,
    ctx: &RequestContext,
    name: &str,
    participants: Vec<String>,
) -> Result<Chat, ChatError> {
    if !ctx.has(Capability::ChatGroup) {
        return Err(ChatError::PermissionDenied);
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(ChatError::Validation("group name is required".to_string()));
    }

    let mut members = vec![ctx.actor.id.clone()];
    for id in participants {
        if !members.contains(&id) {
            members.push(id);
        }
    }
    if members.len() < 2 {
        return Err(ChatError::Validation(
            "a group needs at least one other participant".to_string(),
        ));
    }
    for id in &members[1..] {
        if store.users.load(id).await?.is_none() {
            return Err(ChatError::UserNotFound);
        }
    }

    let chat = Chat::new(ChatKind::Group, members, Some(name.to_string()));
    store.chats.save(&chat).await?;
    info!(
        creator = %ctx.actor.id,
        chat = %chat.id,
        members = chat.participants.len(),
        "created group chat"
    );
    Ok(chat)
}

pub async fn add_participant(
    store: &DataStore,
    ctx: &RequestContext,
    chat_id: &str,
    user_id: &str,
) -> Result<Chat, ChatError> {
    let mut chat = load_chat(store, chat_id).await?;
    require_group_member(ctx, &chat)?;
    if chat.has_participant(user_id) {
        return Ok(chat);
    }
    if store.users.load(user_id).await?.is_none() {
        return Err(ChatError::UserNotFound);
    }
    chat.participants.push(user_id.to_string());
    store.chats.save(&chat).await?;
    info!(actor = %ctx.actor.id, chat = %chat.id, user = %user_id, "added participant");
    Ok(chat)
}

pub async fn remove_participant(
    store: &DataStore,
    ctx: &RequestContext,
    chat_id: &str,
    user_id: &str,
) -> Result<Chat, ChatError> {
    let mut chat = load_chat(store, chat_id).await?;
    require_group_member(ctx, &chat)?;
    if !chat.has_participant(user_id) {
        return Ok(chat);
    }
    chat.participants.retain(|p| p != user_id);
    store.chats.save(&chat).await?;
    info!(actor = %ctx.actor.id, chat = %chat.id, user = %user_id, "removed participant");
    Ok(chat)
}

pub async fn rename_group(
    store: &DataStore,
    ctx: &RequestContext,
    chat_id: &str,
    name: &str,
) -> Result<Chat, ChatError> {
    let mut chat = load_chat(store, chat_id).await?;
    require_group_member(ctx, &chat)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ChatError::Validation("group name is required".to_string()));
    }
    chat.name = Some(name.to_string());
    store.chats.save(&chat).await?;
    Ok(chat)
}

async fn chat_messages(store: &DataStore, chat_id: &str) -> Result<Vec<Message>, StoreError> {
    let mut messages = store.messages.find_by_key(&format!("chat:{chat_id}")).await?;
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(messages)
}

/// The actor's chats with their latest message, most recently active first.
pub async fn chats_for_user(
    store: &DataStore,
    ctx: &RequestContext,
) -> Result<Vec<ChatSummary>, ChatError> {
    let chats = store
        .chats
        .find_by_key(&format!("participant:{}", ctx.actor.id))
        .await?;

    let mut summaries = Vec::with_capacity(chats.len());
    for chat in chats {
        let last_message = chat_messages(store, &chat.id).await?.pop();
        summaries.push(ChatSummary { chat, last_message });
    }
    summaries.sort_by_key(|s| {
        std::cmp::Reverse(
            s.last_message
                .as_ref()
                .map(|m| m.created_at)
                .unwrap_or(s.chat.created_at),
        )
    });
    Ok(summaries)
}

pub async fn get_chat(
    store: &DataStore,
    ctx: &RequestContext,
    chat_id: &str,
) -> Result<Chat, ChatError> {
    let chat = load_chat(store, chat_id).await?;
    require_participant(ctx, &chat)?;
    Ok(chat)
}

pub async fn send_message(
    store: &DataStore,
    ctx: &RequestContext,
    chat_id: &str,
    content: &str,
    attachments: Vec<NewAttachment>,
) -> Result<Message, ChatError> {
    let chat = load_chat(store, chat_id).await?;
    if !permissions::check(&store.users, &ctx.actor, Action::MessageSend, None).await? {
        return Err(ChatError::PermissionDenied);
    }
    require_participant(ctx, &chat)?;
    let content = content.trim();
    if content.is_empty() && attachments.is_empty() {
        return Err(ChatError::Validation(
            "a message needs content or an attachment".to_string(),
        ));
    }

    let message = Message::new(
        chat.id.clone(),
        ctx.actor.id.clone(),
        content.to_string(),
        attachments.into_iter().map(Attachment::from).collect(),
    );
    store.messages.save(&message).await?;

    let recipients = chat.participants.iter().filter(|p| **p != ctx.actor.id);
    let results = join_all(
        recipients.map(|p| notifications::notify_chat(store, p, &chat.id, &ctx.actor.name)),
    )
    .await;
    for err in results.into_iter().filter_map(Result::err) {
        warn!(chat = %chat.id, error = %err, "failed to notify participant");
    }
    Ok(message)
}

/// A page of messages, oldest first.
pub async fn messages(
    store: &DataStore,
    ctx: &RequestContext,
    chat_id: &str,
    limit: usize,
    offset: usize,
) -> Result<Vec<Message>, ChatError> {
    let chat = load_chat(store, chat_id).await?;
    require_participant(ctx, &chat)?;
    Ok(chat_messages(store, &chat.id)
        .await?
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect())
}

/// The sender may always delete; others need `chat_delete`.
pub async fn delete_message(
    store: &DataStore,
    ctx: &RequestContext,
    chat_id: &str,
    message_id: &str,
) -> Result<(), ChatError> {
    let message = store
        .messages
        .load(&Message::stem_for(chat_id, message_id))
        .await?
        .ok_or(ChatError::MessageNotFound)?;

    let allowed = message.sender_id == ctx.actor.id
        || permissions::check(&store.users, &ctx.actor, Action::MessageDelete, None).await?;
    if !allowed {
        return Err(ChatError::PermissionDenied);
    }
    store.messages.delete(&message.file_stem()).await?;
    info!(actor = %ctx.actor.id, chat = %chat_id, message = %message_id, "deleted message");
    Ok(())
}
