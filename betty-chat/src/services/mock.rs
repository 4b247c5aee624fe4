//! Scripted gateway for tests and offline development.
//!
//! Each operation pops its next scripted result; an empty script falls back
//! to a benign default. `hold_next` parks the next call of an operation until
//! the returned sender fires, which lets tests observe in-flight state.

use async_trait::async_trait;
use betty_core::error::GatewayError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{oneshot, Mutex};

use crate::models::message::{DocumentAttachment, DocumentFormat, Message};
use crate::models::wire::{
    ChatReply, ChatStats, FormattedDoc, FormattedDocRequest, GoogleStatus, ReplyBody,
    SendMessageRequest,
};
use crate::services::gateway::ChatGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    SendMessage,
    CreateConversation,
    ConversationHistory,
    DeleteConversation,
    ChatStats,
    CreateFormattedDoc,
    GoogleStatus,
}

#[derive(Default)]
pub struct MockChatGateway {
    replies: Mutex<VecDeque<Result<ChatReply, GatewayError>>>,
    conversation_ids: Mutex<VecDeque<Result<String, GatewayError>>>,
    histories: Mutex<VecDeque<Result<Vec<Message>, GatewayError>>>,
    formatted_docs: Mutex<VecDeque<Result<FormattedDoc, GatewayError>>>,
    google_statuses: Mutex<VecDeque<Result<GoogleStatus, GatewayError>>>,
    stats: Mutex<ChatStats>,
    gates: Mutex<HashMap<MockOperation, oneshot::Receiver<()>>>,
    sent: Mutex<Vec<SendMessageRequest>>,
    exported: Mutex<Vec<FormattedDocRequest>>,
    calls: Mutex<HashMap<MockOperation, usize>>,
    conversation_seq: AtomicUsize,
}

impl MockChatGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain text reply.
    pub fn text_reply(content: &str, conversation_id: Option<&str>) -> ChatReply {
        ChatReply {
            conversation_id: conversation_id.map(str::to_string),
            content: content.to_string(),
            body: ReplyBody::Text,
            task_created: false,
            processing_time: Some(0.4),
        }
    }

    /// Reply announcing a generated markdown document.
    pub fn document_reply(
        content: &str,
        title: &str,
        document: &str,
        conversation_id: Option<&str>,
    ) -> ChatReply {
        ChatReply {
            conversation_id: conversation_id.map(str::to_string),
            content: content.to_string(),
            body: ReplyBody::Document(DocumentAttachment {
                title: title.to_string(),
                content: document.to_string(),
                format: DocumentFormat::Markdown,
                document_id: Some(format!("doc-{}", title.to_lowercase().replace(' ', "-"))),
            }),
            task_created: false,
            processing_time: Some(3.1),
        }
    }

    pub async fn push_reply(&self, reply: Result<ChatReply, GatewayError>) {
        self.replies.lock().await.push_back(reply);
    }

    pub async fn push_conversation_id(&self, id: Result<String, GatewayError>) {
        self.conversation_ids.lock().await.push_back(id);
    }

    pub async fn push_history(&self, history: Result<Vec<Message>, GatewayError>) {
        self.histories.lock().await.push_back(history);
    }

    pub async fn push_formatted_doc(&self, doc: Result<FormattedDoc, GatewayError>) {
        self.formatted_docs.lock().await.push_back(doc);
    }

    pub async fn push_google_status(&self, status: Result<GoogleStatus, GatewayError>) {
        self.google_statuses.lock().await.push_back(status);
    }

    pub async fn set_stats(&self, stats: ChatStats) {
        *self.stats.lock().await = stats;
    }

    /// Park the next call of `operation` until the returned sender fires or
    /// is dropped.
    pub async fn hold_next(&self, operation: MockOperation) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().await.insert(operation, rx);
        tx
    }

    pub async fn calls(&self, operation: MockOperation) -> usize {
        self.calls
            .lock()
            .await
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Every request that reached `send_message`, in order.
    pub async fn sent_requests(&self) -> Vec<SendMessageRequest> {
        self.sent.lock().await.clone()
    }

    pub async fn exported_requests(&self) -> Vec<FormattedDocRequest> {
        self.exported.lock().await.clone()
    }

    async fn enter(&self, operation: MockOperation) {
        *self.calls.lock().await.entry(operation).or_insert(0) += 1;

        let gate = self.gates.lock().await.remove(&operation);
        if let Some(gate) = gate {
            tracing::debug!(?operation, "Mock call parked");
            // A dropped sender releases the call as well.
            let _ = gate.await;
        }
    }
}

#[async_trait]
impl ChatGateway for MockChatGateway {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<ChatReply, GatewayError> {
        self.enter(MockOperation::SendMessage).await;
        self.sent.lock().await.push(request.clone());

        let scripted = self.replies.lock().await.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Self::text_reply(
                "Got it.",
                request.conversation_id.as_deref(),
            ))
        })
    }

    async fn create_conversation(&self) -> Result<String, GatewayError> {
        self.enter(MockOperation::CreateConversation).await;

        let scripted = self.conversation_ids.lock().await.pop_front();
        scripted.unwrap_or_else(|| {
            let seq = self.conversation_seq.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("conv-{}", seq))
        })
    }

    async fn conversation_history(
        &self,
        _conversation_id: &str,
    ) -> Result<Vec<Message>, GatewayError> {
        self.enter(MockOperation::ConversationHistory).await;
        let scripted = self.histories.lock().await.pop_front();
        scripted.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<bool, GatewayError> {
        self.enter(MockOperation::DeleteConversation).await;
        Ok(!conversation_id.is_empty())
    }

    async fn chat_stats(&self) -> Result<ChatStats, GatewayError> {
        self.enter(MockOperation::ChatStats).await;
        Ok(self.stats.lock().await.clone())
    }

    async fn create_formatted_doc(
        &self,
        request: &FormattedDocRequest,
    ) -> Result<FormattedDoc, GatewayError> {
        self.enter(MockOperation::CreateFormattedDoc).await;
        self.exported.lock().await.push(request.clone());

        let scripted = self.formatted_docs.lock().await.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(FormattedDoc {
                document_id: "gdoc-1".to_string(),
                document_url: "https://docs.google.com/document/d/gdoc-1/edit".to_string(),
                formatted: true,
                markdown_converted: request.preserve_markdown,
            })
        })
    }

    async fn google_status(&self) -> Result<GoogleStatus, GatewayError> {
        self.enter(MockOperation::GoogleStatus).await;
        let scripted = self.google_statuses.lock().await.pop_front();
        scripted.unwrap_or(Ok(GoogleStatus {
            connected: false,
            email: None,
        }))
    }
}
