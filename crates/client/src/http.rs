//! HTTP client for the relay API

use std::time::Duration;

use chatrelay_shared::{Conversation, Feedback, Message, Source, StreamEvent, WireFormat};
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::decoder::{decode_stream, ChatCompletion, StreamSink};
use crate::error::{ClientError, ClientResult};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8787";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a chat send
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody<'a> {
    prompt: &'a str,
    stream: bool,
    wire_format: WireFormat,
    #[serde(flatten)]
    options: &'a ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ConversationsBody {
    conversations: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
struct ConversationBody {
    conversation: Conversation,
}

#[derive(Debug, Deserialize)]
struct MessagesBody {
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct SourcesBody {
    sources: Vec<Source>,
}

/// Client scoped to one tenant and user
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
    tenant_id: String,
    user_id: String,
    format: WireFormat,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> ClientResult<Self> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            format: WireFormat::Ndjson,
        })
    }

    /// Base URL from `CHATRELAY_API_URL`, else the local default
    pub fn from_env(tenant_id: &str, user_id: &str) -> ClientResult<Self> {
        let base_url =
            std::env::var("CHATRELAY_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url, tenant_id, user_id)
    }

    /// Framing requested for streamed sends
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    fn build_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/tenant/{}/user/{}/{}",
            self.base_url,
            self.tenant_id,
            self.user_id,
            path.trim_start_matches('/')
        )
    }

    fn message_url(&self, conversation_id: &str, message_id: &str, leaf: &str) -> String {
        self.build_url(&format!(
            "conversation/{}/message/{}/{}",
            conversation_id, message_id, leaf
        ))
    }

    async fn check(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %body, "Relay API request failed");
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Send a prompt.
    ///
    /// Streamed sends forward every event to `sink` as it is decoded. With
    /// `stream` off the server answers with a single `finalMessage`.
    pub async fn send_chat<S: StreamSink + ?Sized>(
        &self,
        conversation_id: &str,
        prompt: &str,
        stream: bool,
        options: &ChatOptions,
        sink: &mut S,
    ) -> ClientResult<ChatCompletion> {
        let url = self.build_url(&format!("conversation/{}/chat", conversation_id));
        let body = ChatBody {
            prompt,
            stream,
            wire_format: self.format,
            options,
        };

        let accept = if stream {
            self.format.content_type()
        } else {
            "application/json"
        };

        tracing::debug!(conversation_id = %conversation_id, stream, format = %self.format, "Sending chat request");

        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, accept)
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        if stream {
            return decode_stream(response.bytes_stream(), self.format, sink).await;
        }

        match response.json::<StreamEvent>().await? {
            StreamEvent::FinalMessage(message) => {
                let documents = message.sources.clone();
                Ok(ChatCompletion { message, documents })
            }
            other => Err(ClientError::UnexpectedResponse(format!(
                "expected finalMessage, got {}",
                other.event_type()
            ))),
        }
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    pub async fn list_conversations(&self) -> ClientResult<Vec<Conversation>> {
        let response = self.http.get(self.build_url("conversation")).send().await?;
        let body: ConversationsBody = Self::check(response).await?.json().await?;
        Ok(body.conversations)
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> ClientResult<Conversation> {
        let response = self
            .http
            .post(self.build_url("conversation"))
            .json(&json!({ "title": title }))
            .send()
            .await?;
        let body: ConversationBody = Self::check(response).await?.json().await?;
        Ok(body.conversation)
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> ClientResult<Conversation> {
        let response = self
            .http
            .patch(self.build_url(&format!("conversation/{}", conversation_id)))
            .json(&json!({ "title": title }))
            .send()
            .await?;
        let body: ConversationBody = Self::check(response).await?.json().await?;
        Ok(body.conversation)
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> ClientResult<()> {
        let response = self
            .http
            .delete(self.build_url(&format!("conversation/{}", conversation_id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn list_messages(&self, conversation_id: &str) -> ClientResult<Vec<Message>> {
        let response = self
            .http
            .get(self.build_url(&format!("conversation/{}/message", conversation_id)))
            .send()
            .await?;
        let body: MessagesBody = Self::check(response).await?.json().await?;
        Ok(body.messages)
    }

    // =========================================================================
    // Message extras
    // =========================================================================

    /// Set (`Some`) or clear (`None`) feedback; returns the updated message
    pub async fn submit_feedback(
        &self,
        conversation_id: &str,
        message_id: &str,
        feedback: Option<&Feedback>,
    ) -> ClientResult<Message> {
        let body = match feedback {
            Some(feedback) => serde_json::to_value(feedback)
                .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))?,
            None => json!({ "feedbackType": null }),
        };
        let response = self
            .http
            .post(self.message_url(conversation_id, message_id, "feedback"))
            .json(&body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn sources(&self, conversation_id: &str, message_id: &str) -> ClientResult<Vec<Source>> {
        let response = self
            .http
            .get(self.message_url(conversation_id, message_id, "sources"))
            .send()
            .await?;
        let body: SourcesBody = Self::check(response).await?.json().await?;
        Ok(body.sources)
    }

    pub async fn questions(
        &self,
        conversation_id: &str,
        message_id: &str,
        config_name: Option<&str>,
    ) -> ClientResult<Vec<String>> {
        let mut request = self
            .http
            .get(self.message_url(conversation_id, message_id, "questions"));
        if let Some(name) = config_name {
            request = request.query(&[("configName", name)]);
        }
        let response = request.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard) -> ChatClient {
        ChatClient::new(server.url(), "tenant-a", "guest-user").unwrap()
    }

    #[test]
    fn test_build_url() {
        let client = ChatClient::new("http://localhost:8787/", "t", "u").unwrap();
        assert_eq!(
            client.build_url("/conversation/c1/chat"),
            "http://localhost:8787/api/v1/tenant/t/user/u/conversation/c1/chat"
        );
    }

    #[tokio::test]
    async fn test_send_chat_streaming() {
        let mut server = mockito::Server::new_async().await;
        let message = Message::assistant("Hello");
        let body: String = [
            StreamEvent::status("Preparing request…"),
            StreamEvent::chunk("Hel"),
            StreamEvent::chunk("lo"),
            StreamEvent::final_message(message.clone()),
        ]
        .iter()
        .map(|event| WireFormat::Ndjson.encode(event).unwrap())
        .collect();

        let mock = server
            .mock("POST", "/api/v1/tenant/tenant-a/user/guest-user/conversation/c1/chat")
            .match_header("accept", "application/x-ndjson")
            .match_body(Matcher::PartialJson(json!({"prompt": "Hi", "stream": true})))
            .with_header("content-type", "application/x-ndjson")
            .with_body(body)
            .create_async()
            .await;

        let completion = client(&server)
            .send_chat("c1", "Hi", true, &ChatOptions::default(), &mut ())
            .await
            .unwrap();

        assert_eq!(completion.message, message);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_chat_event_stream() {
        let mut server = mockito::Server::new_async().await;
        let message = Message::assistant("Hello");
        let body: String = [StreamEvent::chunk("Hello"), StreamEvent::final_message(message.clone())]
            .iter()
            .map(|event| WireFormat::Sse.encode(event).unwrap())
            .collect();

        let mock = server
            .mock("POST", "/api/v1/tenant/tenant-a/user/guest-user/conversation/c1/chat")
            .match_header("accept", "text/event-stream")
            .match_body(Matcher::PartialJson(json!({"wireFormat": "sse"})))
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let completion = client(&server)
            .with_format(WireFormat::Sse)
            .send_chat("c1", "Hi", true, &ChatOptions::default(), &mut ())
            .await
            .unwrap();

        assert_eq!(completion.message, message);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_chat_non_streaming_requires_final_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/tenant/tenant-a/user/guest-user/conversation/c1/chat")
            .with_body(r#"{"type":"statusUpdate","message":{"content":"x"}}"#)
            .create_async()
            .await;

        let result = client(&server)
            .send_chat("c1", "Hi", false, &ChatOptions::default(), &mut ())
            .await;
        assert!(matches!(result, Err(ClientError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_status_error_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/tenant/tenant-a/user/guest-user/conversation/nope/message")
            .with_status(404)
            .with_body(r#"{"error":{"code":"NOT_FOUND","message":"Conversation not found"}}"#)
            .create_async()
            .await;

        match client(&server).list_messages("nope").await {
            Err(ClientError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("Conversation not found"));
            }
            other => panic!("Expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_feedback_sends_null() {
        let mut server = mockito::Server::new_async().await;
        let message = Message::assistant("Answer");
        let mock = server
            .mock(
                "POST",
                "/api/v1/tenant/tenant-a/user/guest-user/conversation/c1/message/m1/feedback",
            )
            .match_body(Matcher::Json(json!({"feedbackType": null})))
            .with_body(serde_json::to_string(&message).unwrap())
            .expect(1)
            .create_async()
            .await;

        let updated = client(&server).submit_feedback("c1", "m1", None).await.unwrap();
        assert_eq!(updated.id, message.id);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_questions_passes_config_name() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                "/api/v1/tenant/tenant-a/user/guest-user/conversation/c1/message/m1/questions",
            )
            .match_query(Matcher::UrlEncoded("configName".into(), "default".into()))
            .with_body(r#"["a","b","c"]"#)
            .create_async()
            .await;

        let questions = client(&server)
            .questions("c1", "m1", Some("default"))
            .await
            .unwrap();
        assert_eq!(questions.len(), 3);
    }
}
