//! Conversation repository
//!
//! Conversations and their messages live behind [`ConversationRepository`] so
//! the relay and the routes never touch process-wide state directly. The only
//! implementation shipped is [`InMemoryStore`], seeded at startup.

pub mod catalog;
pub mod memory;
pub mod seed;

use async_trait::async_trait;
use chatrelay_shared::{Conversation, Feedback, Message};

pub use catalog::Catalog;
pub use memory::InMemoryStore;

/// Error type for repository operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),
}

/// Result type for repository operations
pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn list_conversations(&self) -> Vec<Conversation>;

    async fn get_conversation(&self, conversation_id: &str) -> StoreResult<Conversation>;

    async fn create_conversation(&self, title: Option<&str>) -> Conversation;

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> StoreResult<Conversation>;

    /// Remove a conversation together with its messages
    async fn delete_conversation(&self, conversation_id: &str) -> StoreResult<()>;

    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>>;

    /// Append a message to the end of a conversation
    async fn append_message(&self, conversation_id: &str, message: Message)
        -> StoreResult<Message>;

    async fn get_message(&self, conversation_id: &str, message_id: &str) -> StoreResult<Message>;

    /// Attach feedback to a message, or clear it with `None`
    async fn set_feedback(
        &self,
        conversation_id: &str,
        message_id: &str,
        feedback: Option<Feedback>,
    ) -> StoreResult<Message>;
}
