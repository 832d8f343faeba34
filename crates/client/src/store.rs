//! Client-side conversation state
//!
//! Owns conversation id -> messages plus the transient state of the one
//! stream being tracked. Per conversation the lifecycle is
//! `Idle -> Streaming -> Idle` (success) or `Idle` with an error.
//!
//! Every send hands out a [`StreamTicket`]. Events carrying a ticket that is
//! no longer the tracked one are dropped, so a superseded or cancelled stream
//! can never write into the current state.

use std::collections::HashMap;

use chatrelay_shared::{Conversation, Feedback, Message, Source};

use crate::decoder::ChatCompletion;
use crate::error::{ClientError, ClientResult};

const TITLE_MAX_CHARS: usize = 30;

/// Transient state of the tracked stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStreamState {
    pub conversation_id: String,
    pub is_streaming: bool,
    /// Text accumulated from `messageChunk` events
    pub message: String,
    pub status_update: Option<String>,
    pub error: Option<String>,
}

impl ActiveStreamState {
    fn new(conversation_id: &str, is_streaming: bool) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            is_streaming,
            message: String::new(),
            status_update: None,
            error: None,
        }
    }
}

/// Identifies one send; events are applied only while it is the tracked one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTicket {
    conversation_id: String,
    stream_id: u64,
}

/// Title for a conversation named after its first prompt
pub fn derive_title(prompt: &str) -> Option<String> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    Some(title)
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    active: Option<ActiveStreamState>,
    in_flight: Option<StreamTicket>,
    pending_documents: Option<Vec<Source>>,
    next_stream_id: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Conversations and messages
    // =========================================================================

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    /// Insert or replace a conversation, keeping newest first
    pub fn upsert_conversation(&mut self, conversation: Conversation) {
        match self.conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => self.conversations.insert(0, conversation),
        }
    }

    pub fn remove_conversation(&mut self, conversation_id: &str) {
        self.conversations.retain(|c| c.id != conversation_id);
        self.messages.remove(conversation_id);
        if self.is_streaming(conversation_id) {
            self.cancel(conversation_id);
        }
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn set_messages(&mut self, conversation_id: &str, messages: Vec<Message>) {
        self.messages.insert(conversation_id.to_string(), messages);
    }

    // =========================================================================
    // Streaming lifecycle
    // =========================================================================

    pub fn active_stream(&self) -> Option<&ActiveStreamState> {
        self.active.as_ref()
    }

    /// Whether a send is in flight for the conversation
    pub fn is_streaming(&self, conversation_id: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|t| t.conversation_id == conversation_id)
    }

    pub fn is_current(&self, ticket: &StreamTicket) -> bool {
        self.in_flight.as_ref() == Some(ticket)
    }

    /// Start a send: append the optimistic user message and track the stream.
    ///
    /// A second send on a conversation that is still streaming is rejected.
    /// A send on another conversation supersedes the tracked stream.
    pub fn begin_send(
        &mut self,
        conversation_id: &str,
        prompt: &str,
        streaming: bool,
    ) -> ClientResult<StreamTicket> {
        if prompt.trim().is_empty() {
            return Err(ClientError::EmptyPrompt);
        }
        if self.is_streaming(conversation_id) {
            return Err(ClientError::StreamInFlight(conversation_id.to_string()));
        }
        if let Some(previous) = self.in_flight.take() {
            tracing::debug!(
                superseded = %previous.conversation_id,
                conversation_id = %conversation_id,
                "New send supersedes tracked stream"
            );
        }

        let first_message = self.messages(conversation_id).is_empty();
        self.messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(Message::user(prompt));

        if first_message {
            if let Some(title) = derive_title(prompt) {
                if let Some(conversation) =
                    self.conversations.iter_mut().find(|c| c.id == conversation_id)
                {
                    conversation.title = title;
                }
            }
        }

        self.next_stream_id += 1;
        let ticket = StreamTicket {
            conversation_id: conversation_id.to_string(),
            stream_id: self.next_stream_id,
        };
        self.active = Some(ActiveStreamState::new(conversation_id, streaming));
        self.pending_documents = None;
        self.in_flight = Some(ticket.clone());
        Ok(ticket)
    }

    fn tracked(&mut self, ticket: &StreamTicket, event: &'static str) -> Option<&mut ActiveStreamState> {
        if !self.is_current(ticket) {
            tracing::debug!(
                conversation_id = %ticket.conversation_id,
                event,
                "Dropping event for superseded stream"
            );
            return None;
        }
        self.active.as_mut()
    }

    /// Replace the status text. Returns whether the event was applied.
    pub fn apply_status(&mut self, ticket: &StreamTicket, status: &str) -> bool {
        match self.tracked(ticket, "statusUpdate") {
            Some(active) => {
                active.status_update = Some(status.to_string());
                true
            }
            None => false,
        }
    }

    /// Append a token and clear the status text
    pub fn apply_token(&mut self, ticket: &StreamTicket, token: &str) -> bool {
        match self.tracked(ticket, "messageChunk") {
            Some(active) => {
                active.message.push_str(token);
                active.status_update = None;
                true
            }
            None => false,
        }
    }

    /// Hold citations until the assistant message is finalized
    pub fn apply_documents(&mut self, ticket: &StreamTicket, sources: &[Source]) -> bool {
        if self.tracked(ticket, "documents").is_none() {
            return false;
        }
        self.pending_documents = Some(sources.to_vec());
        true
    }

    /// Mid-stream failure notices are shown like status text
    pub fn apply_error_frame(&mut self, ticket: &StreamTicket, message: &str) -> bool {
        self.apply_status(ticket, message)
    }

    /// Finish a send with the completed assistant message
    pub fn complete(&mut self, ticket: &StreamTicket, completion: ChatCompletion) -> bool {
        if self.tracked(ticket, "finalMessage").is_none() {
            return false;
        }

        let mut message = completion.message;
        let sources = completion
            .documents
            .or_else(|| self.pending_documents.take())
            .or_else(|| message.sources.take());
        message.sources = sources.filter(|s| !s.is_empty());

        self.messages
            .entry(ticket.conversation_id.clone())
            .or_default()
            .push(message);
        self.active = None;
        self.in_flight = None;
        self.pending_documents = None;
        true
    }

    /// Finish a send with an error, keeping partial text and the user message
    pub fn fail(&mut self, ticket: &StreamTicket, error: &ClientError) -> bool {
        let Some(active) = self.tracked(ticket, "error") else {
            return false;
        };
        tracing::warn!(conversation_id = %ticket.conversation_id, error = %error, "Chat send failed");

        active.is_streaming = false;
        active.status_update = None;
        active.error = Some(error.to_string());
        self.in_flight = None;
        self.pending_documents = None;
        true
    }

    /// Stop tracking the conversation's stream; later events for it are dropped
    pub fn cancel(&mut self, conversation_id: &str) {
        if self.is_streaming(conversation_id) {
            self.in_flight = None;
            self.active = None;
            self.pending_documents = None;
        }
    }

    // =========================================================================
    // Feedback
    // =========================================================================

    /// Apply feedback optimistically, returning the previous value for rollback.
    ///
    /// `None` when the message is unknown.
    pub fn apply_feedback(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        feedback: Option<Feedback>,
    ) -> Option<Option<Feedback>> {
        let message = self.message_mut(conversation_id, message_id)?;
        Some(std::mem::replace(&mut message.feedback, feedback))
    }

    /// Restore feedback after the server rejected an update
    pub fn rollback_feedback(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        previous: Option<Feedback>,
    ) {
        if let Some(message) = self.message_mut(conversation_id, message_id) {
            message.feedback = previous;
        }
    }

    fn message_mut(&mut self, conversation_id: &str, message_id: &str) -> Option<&mut Message> {
        self.messages
            .get_mut(conversation_id)?
            .iter_mut()
            .find(|m| m.id == message_id)
    }
}
