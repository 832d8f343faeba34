//! Stream events relayed from the backend to chat clients
//!
//! Every frame on the wire carries exactly one [`StreamEvent`]. A successful
//! stream is zero or more `statusUpdate` / `messageChunk` / `documents`
//! events followed by exactly one `finalMessage`, which is always last.

use serde::{Deserialize, Serialize};

use crate::types::{Message, Source};

/// Payload of text-carrying events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub content: String,
}

/// Payload of the `documents` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentsPayload {
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// One framed event, discriminated on `type` with its body under `message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "camelCase")]
pub enum StreamEvent {
    /// Progress text, not part of the answer
    StatusUpdate(TextPayload),

    /// Incremental fragment of assistant output
    MessageChunk(TextPayload),

    /// Citation list, at most once and before the final message
    Documents(DocumentsPayload),

    /// Terminal event carrying the persisted assistant message
    FinalMessage(Message),

    /// Mid-stream failure notice (SSE framing only)
    Error(TextPayload),
}

impl StreamEvent {
    pub fn status(content: impl Into<String>) -> Self {
        StreamEvent::StatusUpdate(TextPayload {
            content: content.into(),
        })
    }

    pub fn chunk(content: impl Into<String>) -> Self {
        StreamEvent::MessageChunk(TextPayload {
            content: content.into(),
        })
    }

    pub fn documents(sources: Vec<Source>) -> Self {
        StreamEvent::Documents(DocumentsPayload { sources })
    }

    pub fn final_message(message: Message) -> Self {
        StreamEvent::FinalMessage(message)
    }

    pub fn error(content: impl Into<String>) -> Self {
        StreamEvent::Error(TextPayload {
            content: content.into(),
        })
    }

    /// Whether this event ends a successful stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::FinalMessage(_))
    }

    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::StatusUpdate(_) => "statusUpdate",
            StreamEvent::MessageChunk(_) => "messageChunk",
            StreamEvent::Documents(_) => "documents",
            StreamEvent::FinalMessage(_) => "finalMessage",
            StreamEvent::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_update_serialization() {
        let json = serde_json::to_string(&StreamEvent::status("Preparing request…")).unwrap();
        assert_eq!(
            json,
            r#"{"type":"statusUpdate","message":{"content":"Preparing request…"}}"#
        );
    }

    #[test]
    fn test_message_chunk_deserialization() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"messageChunk","message":{"content":"Hel"}}"#)
                .unwrap();
        assert_eq!(event, StreamEvent::chunk("Hel"));
        assert_eq!(event.event_type(), "messageChunk");
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_final_message_round_trip() {
        let source = Source {
            id: "source-2".into(),
            name: "Knowledge Base Article".into(),
            text: "First, obtain your API key from the dashboard.".into(),
            relevant_parts: vec!["First, obtain your API key from the dashboard.".into()],
        };
        let message = Message::assistant("Hello!").with_sources(vec![source]);
        let event = StreamEvent::final_message(message.clone());

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with(r#"{"type":"finalMessage","message":{"_id":"#));

        match serde_json::from_str::<StreamEvent>(&json).unwrap() {
            StreamEvent::FinalMessage(decoded) => {
                assert_eq!(decoded.id, message.id);
                assert_eq!(decoded.role, message.role);
                assert_eq!(decoded.content, message.content);
                assert_eq!(decoded.sources, message.sources);
            }
            other => panic!("Expected FinalMessage, got {:?}", other),
        }
        assert!(event.is_terminal());
    }

    #[test]
    fn test_documents_tolerates_missing_sources() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"documents","message":{}}"#).unwrap();
        assert_eq!(event, StreamEvent::documents(Vec::new()));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"type":"ping","message":{}}"#).is_err());
    }
}
