use futures::StreamExt;
use tokio::sync::mpsc;

use super::types::StreamEvent;
use super::wire::{SseFrame, TypedFrame};

/// Incremental decoder for an event-stream body: raw bytes in, complete
/// lines out. Carries partial UTF-8 sequences and partial lines across
/// chunk boundaries and normalizes CRLF.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    byte_buf: Vec<u8>,
    buffer: String,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk off the wire, returning every line now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.byte_buf.extend_from_slice(bytes);

        // Decode as much valid UTF-8 as possible from the byte buffer
        let decoded = match std::str::from_utf8(&self.byte_buf) {
            Ok(s) => {
                let decoded = s.to_string();
                self.byte_buf.clear();
                decoded
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to == 0 {
                    return Vec::new();
                }
                let decoded = std::str::from_utf8(&self.byte_buf[..valid_up_to])
                    .unwrap()
                    .to_string();
                self.byte_buf.drain(..valid_up_to);
                decoded
            }
        };

        self.buffer.push_str(&decoded.replace("\r\n", "\n"));

        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].to_string();
            self.buffer.drain(..newline + 1);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever trails the last newline once the stream is exhausted.
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }
}

/// Decode one stream line into an event. Lines without the `data:` prefix,
/// empty payloads, malformed JSON, and unrecognized frames all yield `None`.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let payload = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?;

    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<SseFrame>(payload) {
        Ok(SseFrame::Token { token }) => Some(StreamEvent::Token(token)),
        Ok(SseFrame::WebSearch { web_search }) => {
            Some(StreamEvent::WebSearch(web_search.into_result()))
        }
        Ok(SseFrame::Typed(TypedFrame::FinalAnswer { .. })) => Some(StreamEvent::FinalAnswer),
        Ok(SseFrame::Typed(TypedFrame::Error { message })) => Some(StreamEvent::Error(message)),
        Ok(SseFrame::Unknown(value)) => {
            tracing::debug!("Ignoring unknown stream frame: {}", value);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to parse stream frame: {}", e);
            None
        }
    }
}

/// Pump a streaming response into `tx` until a terminal event, the end of
/// the body, or a dropped receiver.
pub async fn pump_sse_stream(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut stream = response.bytes_stream();
    let mut decoder = SseLineDecoder::new();

    while let Some(chunk_result) = stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error(format!("Stream error: {}", e)))
                    .await;
                return;
            }
        };

        for line in decoder.push(&bytes) {
            if let Some(event) = decode_line(&line) {
                let terminal = matches!(event, StreamEvent::FinalAnswer | StreamEvent::Error(_));
                if tx.send(event).await.is_err() {
                    return; // receiver dropped
                }
                if terminal {
                    return;
                }
            }
        }
    }

    // Server closed the body; a final frame may sit after the last newline.
    if let Some(line) = decoder.finish() {
        if let Some(event) = decode_line(&line) {
            let _ = tx.send(event).await;
        }
    }
}
