//! HTTP implementation of the chat gateway.
//!
//! Every request carries the bearer token from the token store and an
//! `x-request-id`. Idempotent reads are retried on transient failures;
//! writes are sent exactly once.

use async_trait::async_trait;
use betty_core::auth::TokenStore;
use betty_core::config::ApiSettings;
use betty_core::error::GatewayError;
use betty_core::observability::{TracedClientExt, TracedRequest};
use betty_core::retry::{retry_call, RetryConfig};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use validator::Validate;

use crate::models::message::Message;
use crate::models::wire::{
    ChatMessageResponse, ChatReply, ChatStats, ConversationHistoryResponse,
    CreateConversationResponse, DeleteConversationResponse, FormattedDoc, FormattedDocRequest,
    GoogleStatus, HistoryMessage, ReplyBody, SendMessageRequest,
};
use crate::services::gateway::ChatGateway;

pub struct HttpChatGateway {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    retry: RetryConfig,
}

impl HttpChatGateway {
    pub fn new(
        settings: &ApiSettings,
        retry: RetryConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            tokens,
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bearer(&self) -> Result<Secret<String>, GatewayError> {
        self.tokens.token().await.ok_or(GatewayError::MissingToken)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: TracedRequest,
        operation: &str,
    ) -> Result<T, GatewayError> {
        let request_id = request.request_id().to_string();

        let response = request.send().await.map_err(|e| {
            let err = GatewayError::from(e);
            tracing::error!(operation, request_id = %request_id, error = %err, "Request failed");
            err
        })?;

        decode(response, operation, &request_id).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &str,
    ) -> Result<T, GatewayError> {
        let token = self.bearer().await?;
        let url = self.url(path);

        retry_call(&self.retry, operation, || {
            let request = self
                .client
                .traced_get(&url)
                .bearer_auth(token.expose_secret());
            self.execute(request, operation)
        })
        .await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, operation: &str) -> Result<T, GatewayError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.bearer().await?;
        let request = self
            .client
            .traced_post(&self.url(path))
            .bearer_auth(token.expose_secret())
            .json(body);

        self.execute(request, operation).await
    }

    async fn delete_json<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &str,
    ) -> Result<T, GatewayError> {
        let token = self.bearer().await?;
        let request = self
            .client
            .traced_delete(&self.url(path))
            .bearer_auth(token.expose_secret());

        self.execute(request, operation).await
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    operation: &str,
    request_id: &str,
) -> Result<T, GatewayError> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await?;

    if status.is_success() {
        tracing::debug!(operation, request_id, status = %status, "Gateway call succeeded");
        return serde_json::from_str(&body).map_err(|e| {
            tracing::error!(operation, request_id, error = %e, "Malformed response body");
            GatewayError::InvalidResponse(e.to_string())
        });
    }

    let err = GatewayError::from_status(status, &body, retry_after);
    tracing::warn!(
        operation,
        request_id,
        status = %status,
        kind = %err.kind(),
        error = %err,
        "Gateway call rejected"
    );
    Err(err)
}

#[async_trait]
impl ChatGateway for HttpChatGateway {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<ChatReply, GatewayError> {
        request.validate()?;

        let raw: ChatMessageResponse = self
            .post_json("/chat/message", request, "send_message")
            .await?;
        let reply = ChatReply::try_from(raw)?;

        tracing::info!(
            conversation_id = ?reply.conversation_id,
            document_created = matches!(reply.body, ReplyBody::Document(_)),
            task_created = reply.task_created,
            "Assistant replied"
        );

        Ok(reply)
    }

    async fn create_conversation(&self) -> Result<String, GatewayError> {
        let created: CreateConversationResponse = self
            .post_json(
                "/chat/conversation/new",
                &serde_json::json!({}),
                "create_conversation",
            )
            .await?;

        if created.conversation_id.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "empty conversation_id".to_string(),
            ));
        }

        tracing::info!(conversation_id = %created.conversation_id, "Conversation created");
        Ok(created.conversation_id)
    }

    async fn conversation_history(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, GatewayError> {
        let history: ConversationHistoryResponse = self
            .get_json(
                &format!("/chat/conversation/{}", conversation_id),
                "conversation_history",
            )
            .await?;

        let total = history.messages.len();
        let messages: Vec<Message> = history
            .messages
            .into_iter()
            .filter_map(HistoryMessage::into_message)
            .collect();

        tracing::debug!(
            conversation_id,
            total,
            kept = messages.len(),
            "Loaded conversation history"
        );
        Ok(messages)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, GatewayError> {
        let deleted: DeleteConversationResponse = self
            .delete_json(
                &format!("/chat/conversation/{}", conversation_id),
                "delete_conversation",
            )
            .await?;

        tracing::info!(conversation_id, success = deleted.success, "Conversation deleted");
        Ok(deleted.success)
    }

    async fn chat_stats(&self) -> Result<ChatStats, GatewayError> {
        self.get_json("/user/stats/chat", "chat_stats").await
    }

    async fn create_formatted_doc(
        &self,
        request: &FormattedDocRequest,
    ) -> Result<FormattedDoc, GatewayError> {
        request.validate()?;

        self.post_json(
            "/api/google/create-formatted-doc",
            request,
            "create_formatted_doc",
        )
        .await
    }

    async fn google_status(&self) -> Result<GoogleStatus, GatewayError> {
        self.get_json("/api/google/status", "google_status").await
    }
}
