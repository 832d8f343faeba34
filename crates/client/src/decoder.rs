//! Incremental decoder for chat response streams
//!
//! Bytes go in as they arrive from the transport; each complete frame is
//! parsed as one [`StreamEvent`] and handed to a [`StreamSink`] in arrival
//! order. The result does not depend on where the transport split the body.

use std::fmt;

use chatrelay_shared::{FrameSplitter, Message, Source, StreamEvent, WireFormat};
use futures::{Stream, StreamExt};

use crate::error::{ClientError, ClientResult};

/// Receives decoded events, one method per event kind
pub trait StreamSink {
    fn on_status_update(&mut self, _status: &str) {}

    fn on_token(&mut self, _token: &str) {}

    fn on_documents(&mut self, _sources: &[Source]) {}

    /// Mid-stream failure notice (`error` frames, SSE only)
    fn on_error_frame(&mut self, _message: &str) {}
}

/// Sink that ignores everything
impl StreamSink for () {}

/// Result of a successfully decoded stream
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub message: Message,
    /// Citations from the `documents` frame, else those on the message
    pub documents: Option<Vec<Source>>,
}

#[derive(Debug)]
pub struct StreamDecoder {
    splitter: FrameSplitter,
    final_message: Option<Message>,
    documents: Option<Vec<Source>>,
}

impl StreamDecoder {
    pub fn new(format: WireFormat) -> Self {
        Self {
            splitter: FrameSplitter::new(format),
            final_message: None,
            documents: None,
        }
    }

    /// Feed bytes and dispatch every frame they complete
    pub fn feed<S: StreamSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) {
        self.splitter.push(bytes);
        while let Some(frame) = self.splitter.next_frame() {
            self.handle_frame(&frame, sink);
        }
    }

    /// Flush after the transport ended.
    ///
    /// Recovers a trailing frame that had no delimiter, then fails unless a
    /// `finalMessage` was seen.
    pub fn finish<S: StreamSink + ?Sized>(mut self, sink: &mut S) -> ClientResult<ChatCompletion> {
        for frame in self.splitter.finish() {
            self.handle_frame(&frame, sink);
        }

        let message = self.final_message.ok_or(ClientError::MissingFinalMessage)?;
        let documents = self
            .documents
            .or_else(|| message.sources.clone().filter(|s| !s.is_empty()));
        Ok(ChatCompletion { message, documents })
    }

    fn handle_frame<S: StreamSink + ?Sized>(&mut self, frame: &str, sink: &mut S) {
        let event: StreamEvent = match serde_json::from_str(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, frame_len = frame.len(), "Skipping malformed stream frame");
                return;
            }
        };

        if self.final_message.is_some() {
            tracing::warn!(event = event.event_type(), "Ignoring frame after final message");
            return;
        }

        match event {
            StreamEvent::StatusUpdate(payload) => {
                if !payload.content.is_empty() {
                    sink.on_status_update(&payload.content);
                }
            }
            StreamEvent::MessageChunk(payload) => {
                if !payload.content.is_empty() {
                    sink.on_token(&payload.content);
                }
            }
            StreamEvent::Documents(payload) => {
                sink.on_documents(&payload.sources);
                self.documents = Some(payload.sources);
            }
            StreamEvent::Error(payload) => sink.on_error_frame(&payload.content),
            StreamEvent::FinalMessage(message) => self.final_message = Some(message),
        }
    }
}

/// Decode a whole response body
pub async fn decode_stream<B, E, S>(
    body: B,
    format: WireFormat,
    sink: &mut S,
) -> ClientResult<ChatCompletion>
where
    B: Stream<Item = Result<bytes::Bytes, E>>,
    E: fmt::Display,
    S: StreamSink + ?Sized,
{
    let mut decoder = StreamDecoder::new(format);
    let mut body = std::pin::pin!(body);

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ClientError::Transport(e.to_string()))?;
        decoder.feed(&chunk, sink);
    }
    decoder.finish(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        statuses: Vec<String>,
        tokens: Vec<String>,
        documents: usize,
        errors: Vec<String>,
    }

    impl StreamSink for Recorder {
        fn on_status_update(&mut self, status: &str) {
            self.statuses.push(status.to_string());
        }

        fn on_token(&mut self, token: &str) {
            self.tokens.push(token.to_string());
        }

        fn on_documents(&mut self, _sources: &[Source]) {
            self.documents += 1;
        }

        fn on_error_frame(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn sample_body(format: WireFormat) -> (String, Message) {
        let message = Message::assistant("Hello");
        let events = vec![
            StreamEvent::status("Preparing request…"),
            StreamEvent::status("Gathering context…"),
            StreamEvent::status("Warming up the model…"),
            StreamEvent::chunk("Hel"),
            StreamEvent::chunk("lo"),
            StreamEvent::final_message(message.clone()),
        ];
        let body = events
            .iter()
            .map(|event| format.encode(event).unwrap())
            .collect();
        (body, message)
    }

    fn decode_in_chunks(body: &[u8], format: WireFormat, size: usize) -> (Recorder, ClientResult<ChatCompletion>) {
        let mut recorder = Recorder::default();
        let mut decoder = StreamDecoder::new(format);
        for chunk in body.chunks(size) {
            decoder.feed(chunk, &mut recorder);
        }
        let result = decoder.finish(&mut recorder);
        (recorder, result)
    }

    #[test]
    fn test_chunk_boundary_independence() {
        for format in [WireFormat::Ndjson, WireFormat::Sse] {
            let (body, message) = sample_body(format);
            let (whole, whole_result) = decode_in_chunks(body.as_bytes(), format, body.len());

            for size in [1, 2, 3, 7, 16, 64] {
                let (split, result) = decode_in_chunks(body.as_bytes(), format, size);
                assert_eq!(split.tokens, whole.tokens, "format {format}, size {size}");
                assert_eq!(split.statuses, whole.statuses);
                assert_eq!(result.unwrap().message, message);
            }

            assert_eq!(whole.tokens.concat(), "Hello");
            assert_eq!(whole.statuses.len(), 3);
            assert_eq!(whole_result.unwrap().message, message);
        }
    }

    #[test]
    fn test_missing_final_message_fails() {
        let body = [
            WireFormat::Ndjson.encode(&StreamEvent::status("Preparing request…")).unwrap(),
            WireFormat::Ndjson.encode(&StreamEvent::chunk("partial")).unwrap(),
        ]
        .concat();

        let (recorder, result) = decode_in_chunks(body.as_bytes(), WireFormat::Ndjson, 5);
        assert!(matches!(result, Err(ClientError::MissingFinalMessage)));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Chat stream ended without a final payload"
        );
        assert_eq!(recorder.tokens, vec!["partial".to_string()]);
    }

    #[test]
    fn test_trailing_frame_without_delimiter() {
        let message = Message::assistant("Done");
        let mut body = WireFormat::Ndjson.encode(&StreamEvent::chunk("Done")).unwrap();
        body.push_str(&serde_json::to_string(&StreamEvent::final_message(message.clone())).unwrap());

        let (_, result) = decode_in_chunks(body.as_bytes(), WireFormat::Ndjson, 4);
        assert_eq!(result.unwrap().message, message);
    }

    #[test]
    fn test_malformed_frames_skipped() {
        let message = Message::assistant("ok");
        let body = format!(
            "{}not json\n{{\"type\":\"unknown\"}}\n\n{}",
            WireFormat::Ndjson.encode(&StreamEvent::chunk("ok")).unwrap(),
            WireFormat::Ndjson
                .encode(&StreamEvent::final_message(message.clone()))
                .unwrap()
        );

        let (recorder, result) = decode_in_chunks(body.as_bytes(), WireFormat::Ndjson, 3);
        assert_eq!(recorder.tokens, vec!["ok".to_string()]);
        assert_eq!(result.unwrap().message, message);
    }

    #[test]
    fn test_documents_and_frames_after_final() {
        let sources = vec![Source {
            id: "source-1".to_string(),
            name: "Guide".to_string(),
            text: "Text".to_string(),
            relevant_parts: Vec::new(),
        }];
        let message = Message::assistant("Answer");
        let body: String = [
            StreamEvent::documents(sources.clone()),
            StreamEvent::final_message(message),
            StreamEvent::chunk("late"),
        ]
        .iter()
        .map(|event| WireFormat::Sse.encode(event).unwrap())
        .collect();

        let (recorder, result) = decode_in_chunks(body.as_bytes(), WireFormat::Sse, 10);
        assert_eq!(recorder.documents, 1);
        assert!(recorder.tokens.is_empty());
        assert_eq!(result.unwrap().documents, Some(sources));
    }

    #[test]
    fn test_error_frames_forwarded() {
        let body: String = [
            StreamEvent::error("Model stream encountered an error."),
            StreamEvent::final_message(Message::assistant("")),
        ]
        .iter()
        .map(|event| WireFormat::Sse.encode(event).unwrap())
        .collect();

        let (recorder, result) = decode_in_chunks(body.as_bytes(), WireFormat::Sse, 8);
        assert_eq!(recorder.errors, vec!["Model stream encountered an error.".to_string()]);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_decode_stream_transport_error() {
        let body = futures::stream::iter(vec![
            Ok(bytes::Bytes::from(
                WireFormat::Ndjson.encode(&StreamEvent::chunk("Hi")).unwrap(),
            )),
            Err("connection reset"),
        ]);

        let mut recorder = Recorder::default();
        let result = decode_stream(body, WireFormat::Ndjson, &mut recorder).await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(recorder.tokens, vec!["Hi".to_string()]);
    }
}
