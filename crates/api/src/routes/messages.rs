//! Per-message routes: feedback, suggested questions and citations

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chatrelay_shared::{Feedback, FeedbackType, Message, Source};
use serde::{Deserialize, Deserializer, Serialize};

use super::MessagePath;
use crate::{
    error::{ApiError, ApiResult, FieldErrors},
    extract::{Validate, ValidatedJson},
    state::AppState,
};

/// Distinguishes an explicit `null` from a missing field
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// =============================================================================
// Feedback
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    /// `1` positive, `0` negative, `null` clears; the field itself is required
    #[serde(default, deserialize_with = "present")]
    pub feedback_type: Option<Option<i64>>,
    pub reason: Option<String>,
    pub text: Option<String>,
    pub acknowledged: Option<bool>,
}

impl FeedbackRequest {
    fn feedback_type(&self) -> Option<FeedbackType> {
        self.feedback_type
            .flatten()
            .and_then(|value| u8::try_from(value).ok())
            .and_then(|value| FeedbackType::try_from(value).ok())
    }
}

impl Validate for FeedbackRequest {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        match self.feedback_type {
            None => errors.add("feedbackType", "Required"),
            Some(Some(value)) if value != 0 && value != 1 => {
                errors.add("feedbackType", "Invalid literal value, expected 1 | 0")
            }
            Some(_) => {}
        }
        errors.into_result()
    }
}

/// Attach feedback to a message, or clear it with `feedbackType: null`
pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(path): Path<MessagePath>,
    ValidatedJson(request): ValidatedJson<FeedbackRequest>,
) -> ApiResult<Json<Message>> {
    let feedback = request.feedback_type().map(|feedback_type| Feedback {
        feedback_type,
        reason: request.reason.clone(),
        text: request.text.clone(),
        acknowledged: request.acknowledged.unwrap_or(false),
    });

    let message = state
        .store
        .set_feedback(&path.conversation_id, &path.message_id, feedback)
        .await?;

    tracing::info!(
        tenant_id = %path.tenant_id,
        user_id = %path.user_id,
        conversation_id = %path.conversation_id,
        message_id = %path.message_id,
        feedback = ?message.feedback.as_ref().map(|f| f.feedback_type),
        "Feedback recorded"
    );
    Ok(Json(message))
}

// =============================================================================
// Suggested questions
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsQuery {
    pub config_name: Option<String>,
}

pub fn suggestions(config_name: Option<&str>) -> Vec<String> {
    let context = match config_name {
        Some(name) if !name.is_empty() => format!(" with configuration \"{}\"", name),
        _ => String::new(),
    };
    vec![
        format!("Can you expand on the previous answer{}?", context),
        format!("What risks should be considered{}?", context),
        format!("What follow-up actions are recommended{}?", context),
    ]
}

pub async fn suggest_questions(
    Path(path): Path<MessagePath>,
    Query(query): Query<QuestionsQuery>,
) -> Json<Vec<String>> {
    tracing::debug!(message_id = %path.message_id, "Suggesting follow-up questions");
    Json(suggestions(query.config_name.as_deref()))
}

// =============================================================================
// Sources
// =============================================================================

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<Source>,
}

/// Citations of a message, falling back to the fixed list
pub async fn message_sources(
    State(state): State<AppState>,
    Path(path): Path<MessagePath>,
) -> ApiResult<Json<SourcesResponse>> {
    let message = state
        .store
        .get_message(&path.conversation_id, &path.message_id)
        .await
        .map_err(|_| ApiError::NotFound("Message not found".to_string()))?;

    let sources = message
        .sources
        .unwrap_or_else(|| state.catalog.sources().to_vec());
    Ok(Json(SourcesResponse { sources }))
}
