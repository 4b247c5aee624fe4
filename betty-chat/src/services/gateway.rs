//! Backend gateway abstraction.
//!
//! The session controller and the document exporter only talk to the
//! backend through this trait, so tests can swap in the scripted mock.

use async_trait::async_trait;
use betty_core::error::GatewayError;

use crate::models::message::Message;
use crate::models::wire::{
    ChatReply, ChatStats, FormattedDoc, FormattedDocRequest, GoogleStatus, SendMessageRequest,
};

#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Create a conversation and send its first message.
    ///
    /// The returned reply always carries the new conversation id. The default
    /// makes two requests; callers bound the pair with a single deadline.
    async fn start_conversation(
        &self,
        request: &SendMessageRequest,
    ) -> Result<ChatReply, GatewayError> {
        let conversation_id = self.create_conversation().await?;
        let mut reply = self
            .send_message(&request.for_conversation(conversation_id.clone()))
            .await?;
        if reply.conversation_id.is_none() {
            reply.conversation_id = Some(conversation_id);
        }
        Ok(reply)
    }

    /// Send a message to an existing conversation.
    async fn send_message(&self, request: &SendMessageRequest) -> Result<ChatReply, GatewayError>;

    /// Returns the new conversation id.
    async fn create_conversation(&self) -> Result<String, GatewayError>;

    /// Ordered message history of a conversation.
    async fn conversation_history(&self, conversation_id: &str)
    -> Result<Vec<Message>, GatewayError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, GatewayError>;

    async fn chat_stats(&self) -> Result<ChatStats, GatewayError>;

    /// Create a formatted Google Doc from generated content.
    async fn create_formatted_doc(
        &self,
        request: &FormattedDocRequest,
    ) -> Result<FormattedDoc, GatewayError>;

    async fn google_status(&self) -> Result<GoogleStatus, GatewayError>;
}
