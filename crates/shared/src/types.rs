//! Common types used across chatrelay

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatRelayError;

// =============================================================================
// Citations
// =============================================================================

/// A citation unit attached to an assistant answer.
///
/// `relevant_parts` are expected, but not guaranteed, to occur verbatim in `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub relevant_parts: Vec<String>,
}

impl Source {
    /// Relevant parts that actually occur in the source text, in order.
    pub fn located_parts(&self) -> Vec<(usize, &str)> {
        let mut located: Vec<(usize, &str)> = self
            .relevant_parts
            .iter()
            .filter_map(|part| self.text.find(part.as_str()).map(|at| (at, part.as_str())))
            .collect();
        located.sort_by_key(|(at, _)| *at);
        located
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Author of a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Output carried by a tool result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolOutput {
    Text { value: String },
}

/// Result of a tool invocation recorded in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "tool-result", rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: ToolOutput,
}

/// Message body: plain text, or the results of one or more tool calls.
///
/// Serialized untagged so text stays a bare JSON string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolResults(Vec<ToolResult>),
}

impl MessageContent {
    /// Render the content as display text
    pub fn to_display_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::ToolResults(results) => results
                .iter()
                .map(|result| match &result.output {
                    ToolOutput::Text { value } => format!("[{}] {}", result.tool_name, value),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// Thumbs up / thumbs down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FeedbackType {
    Negative,
    Positive,
}

impl TryFrom<u8> for FeedbackType {
    type Error = ChatRelayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FeedbackType::Negative),
            1 => Ok(FeedbackType::Positive),
            other => Err(ChatRelayError::InvalidFeedbackType(other)),
        }
    }
}

impl From<FeedbackType> for u8 {
    fn from(value: FeedbackType) -> Self {
        match value {
            FeedbackType::Negative => 0,
            FeedbackType::Positive => 1,
        }
    }
}

/// Feedback attached to an assistant message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub feedback_type: FeedbackType,
    pub reason: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub acknowledged: bool,
}

/// A persisted conversational turn.
///
/// Created once; the only mutation afterwards is attaching feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: format!("msg-{}", Uuid::new_v4()),
            role,
            content: content.into(),
            created_at: Utc::now(),
            sources: None,
            feedback: None,
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach citations; an empty list is stored as no citations.
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = if sources.is_empty() { None } else { Some(sources) };
        self
    }

    pub fn text(&self) -> String {
        self.content.to_display_text()
    }
}

// =============================================================================
// Conversations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
}

impl Conversation {
    pub const DEFAULT_TITLE: &'static str = "New Conversation";

    /// Create a conversation, falling back to the default title when blank
    pub fn new(title: Option<&str>) -> Self {
        let title = match title.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => Self::DEFAULT_TITLE.to_string(),
        };
        Self {
            id: format!("conv-{}", Uuid::new_v4()),
            title,
        }
    }
}

// =============================================================================
// Tenants, users, configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub profiles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub feature_flags: BTreeMap<String, bool>,
}

/// What the technical user may do within a tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalUserPermissions {
    pub can_chat: bool,
    pub can_delete_conversation: bool,
    pub can_provide_feedback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationOption {
    pub name: String,
    pub published_to_main: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestProfile {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_wire_shape() {
        let message = Message::assistant("Hello!");
        let json = serde_json::to_value(&message).unwrap();

        assert!(json["_id"].as_str().unwrap().starts_with("msg-"));
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "Hello!");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("sources").is_none());
        assert!(json.get("feedback").is_none());
    }

    #[test]
    fn test_message_accepts_plain_id() {
        let json = r#"{"id":"m-1","role":"user","content":"hi","createdAt":"2024-01-01T00:00:00Z"}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.id, "m-1");
        assert_eq!(message.role, Role::User);
    }

    #[test]
    fn test_tool_result_content() {
        let json = r#"[{"type":"tool-result","toolCallId":"call-1","toolName":"get_capabilities","output":{"type":"text","value":"code assistance"}}]"#;
        let content: MessageContent = serde_json::from_str(json).unwrap();

        match &content {
            MessageContent::ToolResults(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].tool_call_id, "call-1");
            }
            _ => panic!("Expected tool results"),
        }
        assert_eq!(content.to_display_text(), "[get_capabilities] code assistance");
        assert_eq!(serde_json::to_string(&content).unwrap(), json);
    }

    #[test]
    fn test_feedback_type_numeric() {
        let feedback: Feedback =
            serde_json::from_str(r#"{"feedbackType":0,"reason":"Too long","text":null}"#).unwrap();
        assert_eq!(feedback.feedback_type, FeedbackType::Negative);
        assert!(!feedback.acknowledged);

        let json = serde_json::to_value(&feedback).unwrap();
        assert_eq!(json["feedbackType"], 0);

        assert!(serde_json::from_str::<Feedback>(r#"{"feedbackType":2}"#).is_err());
    }

    #[test]
    fn test_conversation_default_title() {
        assert_eq!(Conversation::new(None).title, "New Conversation");
        assert_eq!(Conversation::new(Some("   ")).title, "New Conversation");
        assert_eq!(Conversation::new(Some(" Plans ")).title, "Plans");
    }

    #[test]
    fn test_located_parts_skips_missing() {
        let source = Source {
            id: "s".into(),
            name: "Guide".into(),
            text: "Alpha beta. Gamma delta.".into(),
            relevant_parts: vec!["Gamma delta.".into(), "Missing".into(), "Alpha".into()],
        };
        let parts = source.located_parts();
        assert_eq!(parts, vec![(0, "Alpha"), (12, "Gamma delta.")]);
    }

    #[test]
    fn test_with_sources_empty_is_none() {
        let message = Message::assistant("x").with_sources(Vec::new());
        assert!(message.sources.is_none());
    }
}
