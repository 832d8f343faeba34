//! Conversation routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chatrelay_shared::{Conversation, Message};
use serde::{Deserialize, Serialize};

use super::{ConversationPath, UserPath};
use crate::{
    error::{ApiResult, FieldErrors},
    extract::{Validate, ValidatedJson},
    state::AppState,
};

const MAX_TITLE_LEN: usize = 200;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameConversationRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

fn check_title_len(errors: &mut FieldErrors, title: &str) {
    if title.chars().count() > MAX_TITLE_LEN {
        errors.add(
            "title",
            format!("String must contain at most {} character(s)", MAX_TITLE_LEN),
        );
    }
}

impl Validate for CreateConversationRequest {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(title) = &self.title {
            check_title_len(&mut errors, title);
        }
        errors.into_result()
    }
}

impl Validate for RenameConversationRequest {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.title.trim().is_empty() {
            errors.add("title", "String must contain at least 1 character(s)");
        }
        check_title_len(&mut errors, &self.title);
        errors.into_result()
    }
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn list_conversations(
    State(state): State<AppState>,
    Path(path): Path<UserPath>,
) -> Json<ConversationsResponse> {
    let conversations = state.store.list_conversations().await;
    tracing::debug!(
        tenant_id = %path.tenant_id,
        user_id = %path.user_id,
        count = conversations.len(),
        "Listed conversations"
    );
    Json(ConversationsResponse { conversations })
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Path(path): Path<UserPath>,
    ValidatedJson(request): ValidatedJson<CreateConversationRequest>,
) -> (StatusCode, Json<ConversationResponse>) {
    let conversation = state
        .store
        .create_conversation(request.title.as_deref())
        .await;
    tracing::debug!(
        tenant_id = %path.tenant_id,
        user_id = %path.user_id,
        conversation_id = %conversation.id,
        "Created conversation"
    );
    (
        StatusCode::CREATED,
        Json(ConversationResponse { conversation }),
    )
}

pub async fn rename_conversation(
    State(state): State<AppState>,
    Path(path): Path<ConversationPath>,
    ValidatedJson(request): ValidatedJson<RenameConversationRequest>,
) -> ApiResult<Json<ConversationResponse>> {
    let conversation = state
        .store
        .rename_conversation(&path.conversation_id, &request.title)
        .await?;
    Ok(Json(ConversationResponse { conversation }))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(path): Path<ConversationPath>,
) -> ApiResult<StatusCode> {
    state.store.delete_conversation(&path.conversation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(path): Path<ConversationPath>,
) -> ApiResult<Json<MessagesResponse>> {
    let messages = state.store.list_messages(&path.conversation_id).await?;
    Ok(Json(MessagesResponse { messages }))
}
