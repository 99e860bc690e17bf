use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatTransport, PromptRequest, StreamEvent};
use crate::models::WebSearchResult;

/// Result from streaming: incremental progress, completion, cancellation,
/// or error. `accumulated` always holds the full concatenation of tokens
/// received so far, in arrival order.
pub enum StreamResult {
    Token {
        message_id: String,
        accumulated: String,
    },
    WebSearch {
        message_id: String,
        result: WebSearchResult,
    },
    Done {
        message_id: String,
        full_content: String,
    },
    Cancelled {
        message_id: String,
        partial: String,
    },
    Error {
        message_id: String,
        error: String,
    },
}

/// Run one streaming exchange, reporting progress through `on_event`.
///
/// Exactly one terminal result (`Done`, `Cancelled`, or `Error`) is reported
/// before this returns. The transport pump runs on its own task and winds
/// down cooperatively once the receiver is dropped, so cancellation never
/// leaves orphaned network work behind.
pub async fn run_streaming<F>(
    transport: Arc<dyn ChatTransport>,
    request: PromptRequest,
    cancel_token: CancellationToken,
    message_id: String,
    mut on_event: F,
) where
    F: FnMut(StreamResult) + Send,
{
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);

    let _pump = tokio::spawn(async move {
        if let Err(e) = transport.stream_message(request, tx.clone()).await {
            let _ = tx.send(StreamEvent::Error(e.to_string())).await;
        }
    });

    let mut accumulated = String::new();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                on_event(StreamResult::Cancelled {
                    message_id,
                    partial: accumulated,
                });
                return;
            }
            event = rx.recv() => {
                match event {
                    Some(StreamEvent::Token(token)) => {
                        accumulated.push_str(&token);
                        on_event(StreamResult::Token {
                            message_id: message_id.clone(),
                            accumulated: accumulated.clone(),
                        });
                    }
                    Some(StreamEvent::WebSearch(result)) => {
                        on_event(StreamResult::WebSearch {
                            message_id: message_id.clone(),
                            result,
                        });
                    }
                    Some(StreamEvent::FinalAnswer) => {
                        on_event(StreamResult::Done {
                            message_id,
                            full_content: accumulated,
                        });
                        return;
                    }
                    Some(StreamEvent::Error(error)) => {
                        on_event(StreamResult::Error { message_id, error });
                        return;
                    }
                    None => {
                        // Stream closed without a final-answer frame
                        on_event(StreamResult::Error {
                            message_id,
                            error: "Stream ended unexpectedly".to_string(),
                        });
                        return;
                    }
                }
            }
        }
    }
}
