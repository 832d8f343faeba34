//! Chat session: the HTTP client driving a [`ConversationStore`]

use chatrelay_shared::{Conversation, Feedback, Message, Source};

use crate::decoder::StreamSink;
use crate::error::{ClientError, ClientResult};
use crate::http::{ChatClient, ChatOptions};
use crate::store::{ConversationStore, StreamTicket};

/// Applies decoded events to the store, forwarding only those still current.
///
/// Citations are held in the store and reported once the message completes.
struct StoreSink<'a, O: ?Sized> {
    store: &'a mut ConversationStore,
    ticket: &'a StreamTicket,
    observer: &'a mut O,
}

impl<O: StreamSink + ?Sized> StreamSink for StoreSink<'_, O> {
    fn on_status_update(&mut self, status: &str) {
        if self.store.apply_status(self.ticket, status) {
            self.observer.on_status_update(status);
        }
    }

    fn on_token(&mut self, token: &str) {
        if self.store.apply_token(self.ticket, token) {
            self.observer.on_token(token);
        }
    }

    fn on_documents(&mut self, sources: &[Source]) {
        self.store.apply_documents(self.ticket, sources);
    }

    fn on_error_frame(&mut self, message: &str) {
        if self.store.apply_error_frame(self.ticket, message) {
            self.observer.on_error_frame(message);
        }
    }
}

pub struct ChatSession {
    client: ChatClient,
    store: ConversationStore,
    options: ChatOptions,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            store: ConversationStore::new(),
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub async fn refresh_conversations(&mut self) -> ClientResult<&[Conversation]> {
        let conversations = self.client.list_conversations().await?;
        self.store.set_conversations(conversations);
        Ok(self.store.conversations())
    }

    pub async fn new_conversation(&mut self, title: Option<&str>) -> ClientResult<Conversation> {
        let conversation = self.client.create_conversation(title).await?;
        self.store.upsert_conversation(conversation.clone());
        self.store.set_messages(&conversation.id, Vec::new());
        Ok(conversation)
    }

    /// Load a conversation's history into the store
    pub async fn open(&mut self, conversation_id: &str) -> ClientResult<&[Message]> {
        let messages = self.client.list_messages(conversation_id).await?;
        self.store.set_messages(conversation_id, messages);
        Ok(self.store.messages(conversation_id))
    }

    pub async fn rename(&mut self, conversation_id: &str, title: &str) -> ClientResult<()> {
        let conversation = self.client.rename_conversation(conversation_id, title).await?;
        self.store.upsert_conversation(conversation);
        Ok(())
    }

    pub async fn delete(&mut self, conversation_id: &str) -> ClientResult<()> {
        self.client.delete_conversation(conversation_id).await?;
        self.store.remove_conversation(conversation_id);
        Ok(())
    }

    /// Send a prompt and drive the store through the stream.
    ///
    /// `observer` sees the same events the store applies, except citations,
    /// which it receives only after the final message arrived. On failure the
    /// store keeps the user message and any partial text.
    pub async fn send<O: StreamSink + ?Sized>(
        &mut self,
        conversation_id: &str,
        prompt: &str,
        stream: bool,
        observer: &mut O,
    ) -> ClientResult<Message> {
        let ticket = self.store.begin_send(conversation_id, prompt, stream)?;

        let mut sink = StoreSink {
            store: &mut self.store,
            ticket: &ticket,
            observer: &mut *observer,
        };
        let result = self
            .client
            .send_chat(conversation_id, prompt, stream, &self.options, &mut sink)
            .await;

        match result {
            Ok(completion) => {
                if !self.store.complete(&ticket, completion) {
                    return Err(ClientError::UnexpectedResponse(
                        "stream was superseded before it completed".to_string(),
                    ));
                }
                let message = self
                    .store
                    .messages(conversation_id)
                    .last()
                    .cloned()
                    .ok_or_else(|| {
                        ClientError::UnexpectedResponse("completed message missing".to_string())
                    })?;
                if let Some(sources) = &message.sources {
                    observer.on_documents(sources);
                }
                Ok(message)
            }
            Err(err) => {
                self.store.fail(&ticket, &err);
                Err(err)
            }
        }
    }

    /// Apply feedback optimistically and roll back if the server rejects it
    pub async fn submit_feedback(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        feedback: Option<Feedback>,
    ) -> ClientResult<Message> {
        let previous = self
            .store
            .apply_feedback(conversation_id, message_id, feedback.clone())
            .ok_or_else(|| {
                ClientError::UnexpectedResponse(format!("unknown message {}", message_id))
            })?;

        match self
            .client
            .submit_feedback(conversation_id, message_id, feedback.as_ref())
            .await
        {
            Ok(updated) => {
                self.store
                    .apply_feedback(conversation_id, message_id, updated.feedback.clone());
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(message_id = %message_id, error = %err, "Feedback rejected, rolling back");
                self.store
                    .rollback_feedback(conversation_id, message_id, previous);
                Err(err)
            }
        }
    }
}
