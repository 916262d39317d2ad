use super::AppState;
use crate::chats::{self, ChatError, ChatSummary, NewAttachment, DEFAULT_PAGE_SIZE};
use crate::context::RequestContext;
use crate::tables::{Chat, Message};
use crate::CHATS_API;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status_code = match self {
            ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::NotFound | ChatError::MessageNotFound | ChatError::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            ChatError::PermissionDenied => StatusCode::FORBIDDEN,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        };
        if status_code.is_server_error() {
            error!(error = %self, "chat request failed");
        }

        (status_code, self.to_string()).into_response()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PrivateChatRequest {
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GroupChatRequest {
    pub name: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParticipantRequest {
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

#[derive(Deserialize, Debug)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(format!("/{CHATS_API}").as_str(), get(list_chats))
        .route(
            format!("/{CHATS_API}/private").as_str(),
            post(open_private_chat),
        )
        .route(
            format!("/{CHATS_API}/group").as_str(),
            post(create_group_chat),
        )
        .route(format!("/{CHATS_API}/:id").as_str(), get(get_chat))
        .route(format!("/{CHATS_API}/:id/name").as_str(), put(rename_group))
        .route(
            format!("/{CHATS_API}/:id/participants").as_str(),
            post(add_participant),
        )
        .route(
            format!("/{CHATS_API}/:id/participants/:user_id").as_str(),
            delete(remove_participant),
        )
        .route(
            format!("/{CHATS_API}/:id/messages").as_str(),
            get(list_messages).post(send_message),
        )
        .route(
            format!("/{CHATS_API}/:id/messages/:message_id").as_str(),
            delete(delete_message),
        )
}

async fn list_chats(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<ChatSummary>>, ChatError> {
    Ok(Json(chats::chats_for_user(&state.store, &ctx).await?))
}

async fn get_chat(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(chat_id): Path<String>,
) -> Result<Json<Chat>, ChatError> {
    Ok(Json(chats::get_chat(&state.store, &ctx, &chat_id).await?))
}

async fn open_private_chat(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<PrivateChatRequest>,
) -> Result<Json<Chat>, ChatError> {
    let chat = chats::open_private_chat(&state.store, &ctx, &payload.user_id).await?;
    Ok(Json(chat))
}

async fn create_group_chat(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<GroupChatRequest>,
) -> Result<(StatusCode, Json<Chat>), ChatError> {
    let chat =
        chats::create_group_chat(&state.store, &ctx, &payload.name, payload.participants).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn rename_group(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(chat_id): Path<String>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<Chat>, ChatError> {
    let chat = chats::rename_group(&state.store, &ctx, &chat_id, &payload.name).await?;
    Ok(Json(chat))
}

async fn add_participant(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(chat_id): Path<String>,
    Json(payload): Json<ParticipantRequest>,
) -> Result<Json<Chat>, ChatError> {
    let chat = chats::add_participant(&state.store, &ctx, &chat_id, &payload.user_id).await?;
    Ok(Json(chat))
}

async fn remove_participant(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((chat_id, user_id)): Path<(String, String)>,
) -> Result<Json<Chat>, ChatError> {
    let chat = chats::remove_participant(&state.store, &ctx, &chat_id, &user_id).await?;
    Ok(Json(chat))
}

async fn list_messages(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(chat_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Message>>, ChatError> {
    let messages =
        chats::messages(&state.store, &ctx, &chat_id, page.limit, page.offset).await?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(chat_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ChatError> {
    let message = chats::send_message(
        &state.store,
        &ctx,
        &chat_id,
        &payload.content,
        payload.attachments,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn delete_message(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> Result<StatusCode, ChatError> {
    chats::delete_message(&state.store, &ctx, &chat_id, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
