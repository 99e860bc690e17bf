use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatTransport, FileAttachment, PromptRequest};
use crate::models::{Conversation, Message, Role};
use crate::services::chat::{self, StreamResult};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("A message is already streaming")]
    Busy,

    #[error("Stream failed: {0}")]
    StreamFailed(String),

    #[error("No assistant reply to retry")]
    NothingToRetry,

    #[error("No interrupted reply to continue")]
    NothingToContinue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Streaming,
}

/// How a streaming exchange ended. Failures are reported as `ChatError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Complete,
    Cancelled,
}

/// Per-send options. `cancel` is the handle the owner keeps to stop the
/// exchange from outside (a stop button, the conversation being dismissed);
/// when absent the exchange runs to its terminal event.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub web_search: bool,
    pub files: Vec<FileAttachment>,
    pub cancel: Option<CancellationToken>,
}

/// Owns one conversation's message list and drives streaming exchanges
/// against it.
///
/// At most one assistant message is in flight at a time. Sends take
/// `&mut self`, so overlapping exchanges on one conversation cannot compile;
/// the state flag additionally surfaces `Busy` should a caller hold the
/// synchronizer behind its own locking.
pub struct ConversationSynchronizer {
    conversation: Conversation,
    transport: Arc<dyn ChatTransport>,
    state: SyncState,
}

impl ConversationSynchronizer {
    pub fn new(conversation: Conversation, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            conversation,
            transport,
            state: SyncState::Idle,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_interacting(&self) -> bool {
        self.state == SyncState::Streaming
    }

    /// Give the conversation back, e.g. to cache it on dismissal.
    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }

    /// Send a user message and stream the assistant reply into a fresh
    /// placeholder. `on_delta` receives each token fragment as it arrives.
    pub async fn send_message<F>(
        &mut self,
        prompt: &str,
        options: SendOptions,
        on_delta: F,
    ) -> Result<SendOutcome, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        self.ensure_idle()?;

        let user = Message::user(&self.conversation.id, prompt);
        let mut request = PromptRequest::new(&self.conversation.id, &user.id, prompt);
        request.web_search = options.web_search;
        request.files = options.files;

        self.conversation.messages.push(user);

        let placeholder = Message::placeholder(&self.conversation.id);
        let placeholder_id = placeholder.id.clone();
        self.conversation.messages.push(placeholder);

        self.stream_exchange(request, placeholder_id, String::new(), true, options.cancel, on_delta)
            .await
    }

    /// Discard the last assistant reply and stream a replacement for it.
    pub async fn retry_message<F>(
        &mut self,
        options: SendOptions,
        on_delta: F,
    ) -> Result<SendOutcome, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        self.ensure_idle()?;

        let assistant_idx = self
            .conversation
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
            .ok_or(ChatError::NothingToRetry)?;

        let user = self.conversation.messages[..assistant_idx]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or(ChatError::NothingToRetry)?;

        let mut request = PromptRequest::new(&self.conversation.id, &user.id, &user.content);
        request.is_retry = true;
        request.web_search = options.web_search;

        // Drop the stale reply and everything after it
        self.conversation.messages.truncate(assistant_idx);

        let placeholder = Message::placeholder(&self.conversation.id);
        let placeholder_id = placeholder.id.clone();
        self.conversation.messages.push(placeholder);

        self.stream_exchange(request, placeholder_id, String::new(), true, options.cancel, on_delta)
            .await
    }

    /// Resume an interrupted assistant reply, appending to its content.
    pub async fn continue_message<F>(
        &mut self,
        options: SendOptions,
        on_delta: F,
    ) -> Result<SendOutcome, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        self.ensure_idle()?;

        let last = self
            .conversation
            .messages
            .last_mut()
            .ok_or(ChatError::NothingToContinue)?;
        if last.role != Role::Assistant || !last.interrupted {
            return Err(ChatError::NothingToContinue);
        }

        let mut request = PromptRequest::new(&self.conversation.id, &last.id, "");
        request.is_continue = true;

        let message_id = last.id.clone();
        let base = last.content.clone();
        last.interrupted = false;

        self.stream_exchange(request, message_id, base, false, options.cancel, on_delta)
            .await
    }

    fn ensure_idle(&self) -> Result<(), ChatError> {
        match self.state {
            SyncState::Idle => Ok(()),
            SyncState::Streaming => Err(ChatError::Busy),
        }
    }

    /// Drive one exchange to its terminal result, applying every stream
    /// event to the target message. `base` is the content already present
    /// when continuing; `fresh` marks a placeholder this exchange created
    /// (removed on failure, whereas a continued reply is restored).
    async fn stream_exchange<F>(
        &mut self,
        request: PromptRequest,
        message_id: String,
        base: String,
        fresh: bool,
        cancel: Option<CancellationToken>,
        mut on_delta: F,
    ) -> Result<SendOutcome, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        self.state = SyncState::Streaming;

        let transport = self.transport.clone();
        let cancel_token = cancel.unwrap_or_default();
        let mut outcome: Option<Result<SendOutcome, ChatError>> = None;

        {
            // Single writer: only this closure touches the in-flight message
            // until a terminal result lands.
            let messages = &mut self.conversation.messages;
            let mut emitted = 0usize;

            chat::run_streaming(transport, request, cancel_token, message_id, |result| {
                match result {
                    StreamResult::Token {
                        message_id,
                        accumulated,
                    } => {
                        let delta = &accumulated[emitted..];
                        if !delta.is_empty() {
                            on_delta(delta);
                        }
                        emitted = accumulated.len();
                        if let Some(msg) = messages.iter_mut().find(|m| m.id == message_id) {
                            msg.content = format!("{}{}", base, accumulated);
                        }
                    }
                    StreamResult::WebSearch { message_id, result } => {
                        if let Some(msg) = messages.iter_mut().find(|m| m.id == message_id) {
                            msg.web_search = Some(result);
                        }
                    }
                    StreamResult::Done {
                        message_id,
                        full_content,
                    } => {
                        if let Some(msg) = messages.iter_mut().find(|m| m.id == message_id) {
                            msg.content = format!("{}{}", base, full_content);
                            msg.interrupted = false;
                        }
                        outcome = Some(Ok(SendOutcome::Complete));
                    }
                    StreamResult::Cancelled {
                        message_id,
                        partial,
                    } => {
                        if base.is_empty() && partial.is_empty() {
                            messages.retain(|m| m.id != message_id);
                        } else if let Some(msg) = messages.iter_mut().find(|m| m.id == message_id)
                        {
                            msg.content = format!("{}{}", base, partial);
                            msg.interrupted = true;
                        }
                        outcome = Some(Ok(SendOutcome::Cancelled));
                    }
                    StreamResult::Error { message_id, error } => {
                        if fresh {
                            messages.retain(|m| m.id != message_id);
                        } else if let Some(msg) = messages.iter_mut().find(|m| m.id == message_id)
                        {
                            msg.content = base.clone();
                            msg.interrupted = true;
                        }
                        outcome = Some(Err(ChatError::StreamFailed(error)));
                    }
                }
            })
            .await;
        }

        self.conversation.updated_at = Utc::now();
        self.state = SyncState::Idle;

        outcome.unwrap_or_else(|| {
            Err(ChatError::StreamFailed(
                "Stream produced no terminal result".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::api::{ApiError, StreamEvent};
    use crate::models::{WebSearchResult, WebSearchSource};

    /// Transport that replays a fixed event script.
    struct ScriptedTransport {
        events: Vec<StreamEvent>,
        /// When set, fail before sending anything.
        fail: Option<String>,
        /// When set, never finish after the script (for cancellation tests).
        hang: bool,
    }

    impl ScriptedTransport {
        fn new(events: Vec<StreamEvent>) -> Self {
            Self {
                events,
                fail: None,
                hang: false,
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                events: Vec::new(),
                fail: Some(message.to_string()),
                hang: false,
            }
        }

        fn hanging(events: Vec<StreamEvent>) -> Self {
            Self {
                events,
                fail: None,
                hang: true,
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn stream_message(
            &self,
            _request: PromptRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ApiError> {
            if let Some(message) = &self.fail {
                return Err(ApiError::RequestFailed {
                    status: 500,
                    message: message.clone(),
                });
            }
            for event in self.events.clone() {
                if tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn conversation() -> Conversation {
        let now = Utc::now();
        Conversation {
            id: "conv-1".to_string(),
            title: String::new(),
            model: "test-model".to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn synchronizer(transport: ScriptedTransport) -> ConversationSynchronizer {
        ConversationSynchronizer::new(conversation(), Arc::new(transport))
    }

    #[tokio::test]
    async fn test_tokens_concatenate_in_arrival_order() {
        let mut sync = synchronizer(ScriptedTransport::new(vec![
            StreamEvent::Token("Hel".to_string()),
            StreamEvent::Token("lo".to_string()),
            StreamEvent::FinalAnswer,
        ]));

        let mut deltas = Vec::new();
        let outcome = sync
            .send_message("hi", SendOptions::default(), |d| deltas.push(d.to_string()))
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::Complete);
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(sync.state(), SyncState::Idle);

        let messages = sync.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello");
        assert!(!messages[1].interrupted);
    }

    #[tokio::test]
    async fn test_duplicate_tokens_double_append() {
        // No dedup is performed: a re-sent fragment appends twice.
        let mut sync = synchronizer(ScriptedTransport::new(vec![
            StreamEvent::Token("ab".to_string()),
            StreamEvent::Token("ab".to_string()),
            StreamEvent::FinalAnswer,
        ]));

        sync.send_message("hi", SendOptions::default(), |_| {})
            .await
            .unwrap();

        assert_eq!(sync.messages()[1].content, "abab");
    }

    #[tokio::test]
    async fn test_stream_end_without_final_answer_removes_placeholder() {
        let mut sync = synchronizer(ScriptedTransport::new(vec![StreamEvent::Token(
            "partial".to_string(),
        )]));

        let err = sync
            .send_message("hi", SendOptions::default(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::StreamFailed(_)));
        // Only the user message remains
        assert_eq!(sync.messages().len(), 1);
        assert_eq!(sync.messages()[0].role, Role::User);
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_transport_failure_removes_placeholder() {
        let mut sync = synchronizer(ScriptedTransport::failing("boom"));

        let err = sync
            .send_message("hi", SendOptions::default(), |_| {})
            .await
            .unwrap_err();

        match err {
            ChatError::StreamFailed(msg) => assert!(msg.contains("boom")),
            other => panic!("Expected StreamFailed, got {:?}", other),
        }
        assert_eq!(sync.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_error_frame_removes_placeholder() {
        let mut sync = synchronizer(ScriptedTransport::new(vec![
            StreamEvent::Token("He".to_string()),
            StreamEvent::Error("overloaded".to_string()),
        ]));

        let err = sync
            .send_message("hi", SendOptions::default(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::StreamFailed(_)));
        assert_eq!(sync.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_web_search_attached_to_placeholder() {
        let sources = vec![WebSearchSource {
            title: "Docs".to_string(),
            link: "https://example.com".to_string(),
        }];
        let mut sync = synchronizer(ScriptedTransport::new(vec![
            StreamEvent::WebSearch(WebSearchResult {
                sources: sources.clone(),
            }),
            StreamEvent::Token("answer".to_string()),
            StreamEvent::FinalAnswer,
        ]));

        sync.send_message("hi", SendOptions::default(), |_| {})
            .await
            .unwrap();

        let reply = &sync.messages()[1];
        assert_eq!(reply.web_search.as_ref().unwrap().sources, sources);
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_and_marks_interrupted() {
        let mut sync = synchronizer(ScriptedTransport::hanging(vec![StreamEvent::Token(
            "Hel".to_string(),
        )]));

        let cancel = CancellationToken::new();
        let handle = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            handle.cancel();
        });

        let options = SendOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        let outcome = sync.send_message("hi", options, |_| {}).await.unwrap();

        assert_eq!(outcome, SendOutcome::Cancelled);
        let reply = &sync.messages()[1];
        assert_eq!(reply.content, "Hel");
        assert!(reply.interrupted);
    }

    #[tokio::test]
    async fn test_cancel_before_any_token_removes_placeholder() {
        let mut sync = synchronizer(ScriptedTransport::hanging(Vec::new()));

        let cancel = CancellationToken::new();
        let handle = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            handle.cancel();
        });

        let options = SendOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        let outcome = sync.send_message("hi", options, |_| {}).await.unwrap();

        assert_eq!(outcome, SendOutcome::Cancelled);
        assert_eq!(sync.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_continue_appends_to_interrupted_reply() {
        let mut conv = conversation();
        conv.messages.push(Message::user("conv-1", "hi"));
        let mut reply = Message::placeholder("conv-1");
        reply.content = "Hel".to_string();
        reply.interrupted = true;
        conv.messages.push(reply);

        let transport = ScriptedTransport::new(vec![
            StreamEvent::Token("lo".to_string()),
            StreamEvent::FinalAnswer,
        ]);
        let mut sync = ConversationSynchronizer::new(conv, Arc::new(transport));

        let outcome = sync
            .continue_message(SendOptions::default(), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome, SendOutcome::Complete);
        let reply = &sync.messages()[1];
        assert_eq!(reply.content, "Hello");
        assert!(!reply.interrupted);
    }

    #[tokio::test]
    async fn test_continue_failure_restores_prior_content() {
        let mut conv = conversation();
        conv.messages.push(Message::user("conv-1", "hi"));
        let mut reply = Message::placeholder("conv-1");
        reply.content = "Hel".to_string();
        reply.interrupted = true;
        conv.messages.push(reply);

        let transport = ScriptedTransport::new(vec![StreamEvent::Token("lo".to_string())]);
        let mut sync = ConversationSynchronizer::new(conv, Arc::new(transport));

        let err = sync
            .continue_message(SendOptions::default(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::StreamFailed(_)));
        let reply = &sync.messages()[1];
        assert_eq!(reply.content, "Hel");
        assert!(reply.interrupted);
    }

    #[tokio::test]
    async fn test_continue_requires_interrupted_reply() {
        let mut conv = conversation();
        conv.messages.push(Message::user("conv-1", "hi"));
        let mut sync =
            ConversationSynchronizer::new(conv, Arc::new(ScriptedTransport::new(Vec::new())));

        let err = sync
            .continue_message(SendOptions::default(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NothingToContinue));
    }

    #[tokio::test]
    async fn test_retry_replaces_last_reply() {
        let mut conv = conversation();
        conv.messages.push(Message::user("conv-1", "hi"));
        let mut reply = Message::placeholder("conv-1");
        reply.content = "first attempt".to_string();
        conv.messages.push(reply);

        let transport = ScriptedTransport::new(vec![
            StreamEvent::Token("second attempt".to_string()),
            StreamEvent::FinalAnswer,
        ]);
        let mut sync = ConversationSynchronizer::new(conv, Arc::new(transport));

        sync.retry_message(SendOptions::default(), |_| {})
            .await
            .unwrap();

        let messages = sync.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "second attempt");
    }

    #[tokio::test]
    async fn test_retry_without_reply_errors() {
        let mut sync = synchronizer(ScriptedTransport::new(Vec::new()));
        let err = sync
            .retry_message(SendOptions::default(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NothingToRetry));
    }
}
