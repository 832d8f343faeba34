//! In-memory conversation repository

use std::collections::HashMap;

use async_trait::async_trait;
use chatrelay_shared::{Conversation, Feedback, Message};
use tokio::sync::RwLock;

use super::{seed, ConversationRepository, StoreError, StoreResult};

#[derive(Debug, Default)]
struct StoreInner {
    /// Conversations in display order, newest first
    conversations: Vec<Conversation>,
    /// Messages per conversation, oldest first
    messages: HashMap<String, Vec<Message>>,
}

impl StoreInner {
    fn contains(&self, conversation_id: &str) -> bool {
        self.conversations.iter().any(|c| c.id == conversation_id)
    }
}

/// Repository holding everything in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store populated with the demo conversations
    pub fn seeded() -> Self {
        let (conversations, messages) = seed::conversations();
        tracing::debug!(
            conversations = conversations.len(),
            "Seeded in-memory conversation store"
        );
        Self {
            inner: RwLock::new(StoreInner {
                conversations,
                messages,
            }),
        }
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn list_conversations(&self) -> Vec<Conversation> {
        self.inner.read().await.conversations.clone()
    }

    async fn get_conversation(&self, conversation_id: &str) -> StoreResult<Conversation> {
        self.inner
            .read()
            .await
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))
    }

    async fn create_conversation(&self, title: Option<&str>) -> Conversation {
        let conversation = Conversation::new(title);
        let mut inner = self.inner.write().await;
        inner.conversations.insert(0, conversation.clone());
        inner.messages.insert(conversation.id.clone(), Vec::new());

        tracing::info!(conversation_id = %conversation.id, "Conversation created");
        conversation
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> StoreResult<Conversation> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        conversation.title = title.trim().to_string();
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let index = inner
            .conversations
            .iter()
            .position(|c| c.id == conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        inner.conversations.remove(index);
        inner.messages.remove(conversation_id);

        tracing::info!(conversation_id = %conversation_id, "Conversation deleted");
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        if !inner.contains(conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        Ok(inner
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: Message,
    ) -> StoreResult<Message> {
        let mut inner = self.inner.write().await;
        if !inner.contains(conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        inner
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn get_message(&self, conversation_id: &str, message_id: &str) -> StoreResult<Message> {
        let inner = self.inner.read().await;
        if !inner.contains(conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        inner
            .messages
            .get(conversation_id)
            .and_then(|messages| messages.iter().find(|m| m.id == message_id))
            .cloned()
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))
    }

    async fn set_feedback(
        &self,
        conversation_id: &str,
        message_id: &str,
        feedback: Option<Feedback>,
    ) -> StoreResult<Message> {
        let mut inner = self.inner.write().await;
        if !inner.contains(conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        let message = inner
            .messages
            .get_mut(conversation_id)
            .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        message.feedback = feedback;
        Ok(message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_shared::FeedbackType;

    #[tokio::test]
    async fn test_seeded_store_lists_conversations() {
        let store = InMemoryStore::seeded();
        let conversations = store.list_conversations().await;
        assert_eq!(conversations.len(), 4);
        assert_eq!(conversations[0].id, "seed-1");

        let messages = store.list_messages("seed-1").await.unwrap();
        assert_eq!(messages.len(), 4);
        assert!(messages[0].sources.is_some());
    }

    #[tokio::test]
    async fn test_create_append_and_delete() {
        let store = InMemoryStore::new();
        let conversation = store.create_conversation(Some("Planning")).await;
        assert_eq!(store.list_conversations().await.len(), 1);

        let message = store
            .append_message(&conversation.id, Message::user("Hi"))
            .await
            .unwrap();
        let fetched = store.get_message(&conversation.id, &message.id).await.unwrap();
        assert_eq!(fetched, message);

        store.delete_conversation(&conversation.id).await.unwrap();
        assert!(store.list_conversations().await.is_empty());
        assert_eq!(
            store.list_messages(&conversation.id).await,
            Err(StoreError::ConversationNotFound(conversation.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_append_to_unknown_conversation() {
        let store = InMemoryStore::new();
        let result = store.append_message("missing", Message::user("Hi")).await;
        assert!(matches!(result, Err(StoreError::ConversationNotFound(_))));
    }

    #[tokio::test]
    async fn test_new_conversations_listed_first() {
        let store = InMemoryStore::seeded();
        let created = store.create_conversation(None).await;
        assert_eq!(store.list_conversations().await[0], created);
    }

    #[tokio::test]
    async fn test_rename_conversation() {
        let store = InMemoryStore::seeded();
        let renamed = store.rename_conversation("seed-2", "  Onboarding ").await.unwrap();
        assert_eq!(renamed.title, "Onboarding");
        assert!(store.rename_conversation("nope", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_set_and_clear_feedback() {
        let store = InMemoryStore::seeded();
        let feedback = Feedback {
            feedback_type: FeedbackType::Positive,
            reason: None,
            text: Some("Helpful".to_string()),
            acknowledged: false,
        };

        let updated = store
            .set_feedback("seed-1", "seed-1-msg-3", Some(feedback.clone()))
            .await
            .unwrap();
        assert_eq!(updated.feedback, Some(feedback));

        let cleared = store.set_feedback("seed-1", "seed-1-msg-3", None).await.unwrap();
        assert!(cleared.feedback.is_none());

        let missing = store.set_feedback("seed-1", "nope", None).await;
        assert_eq!(missing, Err(StoreError::MessageNotFound("nope".to_string())));
    }
}
