use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{RETRY_AFTER, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::mpsc;

use super::stream::pump_sse_stream;
use super::types::{ApiError, ChatTransport, PromptRequest, StreamEvent};
use super::wire::{
    ConversationListResponse, ErrorResponse, FilePayload, ModelListResponse, NewConversationBody,
    NewConversationResponse, PromptBody, RenameBody, SummarizeResponse, WireConversation,
};
use crate::config;
use crate::models::{ChatModel, Conversation};

/// HTTP client for the chat service. Holds the session token and speaks
/// every endpoint: conversation CRUD, model listing, login exchange, and the
/// streaming prompt endpoint.
pub struct ChatClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(config::USER_AGENT)
            .connect_timeout(Duration::from_secs(config::CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn set_token(&self, token: String) {
        *self.token.write().unwrap() = Some(token);
    }

    pub fn clear_token(&self) {
        *self.token.write().unwrap() = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().unwrap().is_some()
    }

    /// URL the user opens in a browser to start the login flow.
    pub fn login_url(&self) -> String {
        format!("{}/login", self.base_url)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn auth_cookie(&self) -> Result<String, ApiError> {
        let token = self.token.read().unwrap();
        match token.as_deref() {
            Some(t) => Ok(format!("{}={}", config::TOKEN_COOKIE, t)),
            None => Err(ApiError::NotAuthenticated),
        }
    }

    /// Authenticated request with the plain-request timeout applied.
    fn request(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        Ok(builder
            .header(reqwest::header::COOKIE, self.auth_cookie()?)
            .timeout(Duration::from_secs(config::REQUEST_TIMEOUT_SECS)))
    }

    fn parse_error_message(status: StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
            return parsed.message;
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }

    /// Map non-2xx statuses onto the error taxonomy.
    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::NotAuthenticated);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ApiError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::RequestFailed {
                status: status.as_u16(),
                message: Self::parse_error_message(status, &body),
            });
        }

        Ok(response)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .request(builder)?
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::check_status(response).await
    }

    // --- Conversations ---

    pub async fn create_conversation(&self, model: &str) -> Result<Conversation, ApiError> {
        let response = self
            .send(
                self.http
                    .post(self.endpoint("conversation"))
                    .json(&NewConversationBody { model }),
            )
            .await?;

        let created: NewConversationResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let now = chrono::Utc::now();
        Ok(Conversation {
            id: created.conversation_id,
            title: String::new(),
            model: model.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let response = self.send(self.http.get(self.endpoint("conversations"))).await?;

        let listing: ConversationListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        Ok(listing
            .conversations
            .into_iter()
            .map(WireConversation::into_conversation)
            .collect())
    }

    pub async fn fetch_conversation(&self, id: &str) -> Result<Conversation, ApiError> {
        let response = self
            .send(self.http.get(self.endpoint(&format!("conversation/{}", id))))
            .await?;

        let detail: WireConversation = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        Ok(detail.into_conversation())
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        self.send(
            self.http
                .delete(self.endpoint(&format!("conversation/{}", id))),
        )
        .await?;
        Ok(())
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> Result<(), ApiError> {
        self.send(
            self.http
                .patch(self.endpoint(&format!("conversation/{}", id)))
                .json(&RenameBody { title }),
        )
        .await?;
        Ok(())
    }

    /// Ask the service to generate a title from the conversation so far.
    pub async fn summarize_conversation(&self, id: &str) -> Result<String, ApiError> {
        let response = self
            .send(
                self.http
                    .post(self.endpoint(&format!("conversation/{}/summarize", id))),
            )
            .await?;

        let summary: SummarizeResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        Ok(summary.title)
    }

    // --- Models ---

    /// Also serves as a session check: an expired token surfaces here as
    /// `NotAuthenticated`.
    pub async fn list_models(&self) -> Result<Vec<ChatModel>, ApiError> {
        let response = self.send(self.http.get(self.endpoint("models"))).await?;

        let listing: ModelListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        Ok(listing.models.into_iter().map(|m| m.into_model()).collect())
    }

    // --- Login ---

    /// Exchange the OAuth redirect's code/state pair for a session token.
    /// Unauthenticated: this is how the first token is obtained.
    pub async fn exchange_login_code(&self, code: &str, state: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.endpoint("login/callback"))
            .query(&[("code", code), ("state", state)])
            .timeout(Duration::from_secs(config::REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;

        let prefix = format!("{}=", config::TOKEN_COOKIE);
        for value in response.headers().get_all(SET_COOKIE) {
            if let Ok(cookie) = value.to_str() {
                if let Some(rest) = cookie.strip_prefix(&prefix) {
                    let token = rest.split(';').next().unwrap_or(rest).to_string();
                    if !token.is_empty() {
                        return Ok(token);
                    }
                }
            }
        }

        Err(ApiError::InvalidResponse(
            "No session cookie in login response".to_string(),
        ))
    }

    fn build_prompt_body(request: &PromptRequest) -> PromptBody<'_> {
        let files = request
            .files
            .iter()
            .map(|f| FilePayload {
                name: f.name.clone(),
                mime: f.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&f.data),
            })
            .collect();

        PromptBody {
            inputs: &request.inputs,
            id: &request.message_id,
            is_retry: request.is_retry,
            is_continue: request.is_continue,
            web_search: request.web_search,
            files,
        }
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn stream_message(
        &self,
        request: PromptRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("conversation/{}", request.conversation_id));
        let body = Self::build_prompt_body(&request);

        // No request timeout here: the stream stays open until the final
        // answer or the server hangs up.
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::COOKIE, self.auth_cookie()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;

        pump_sse_stream(response, tx).await;

        Ok(())
    }
}
