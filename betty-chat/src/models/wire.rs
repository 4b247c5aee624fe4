//! Request and response bodies exchanged with the Betty backend.
//!
//! Raw responses are deserialised into the `*Response` types and validated
//! into domain types before they leave the gateway.

use betty_core::error::GatewayError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::message::{DocumentAttachment, DocumentFormat, Message, MessageBody, MessageType, Role};

const UNTITLED_DOCUMENT: &str = "Untitled document";

/// Body of `POST /chat/message`.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 8000))]
    pub content: String,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl SendMessageRequest {
    pub fn text(content: impl Into<String>, conversation_id: Option<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Text,
            conversation_id,
        }
    }

    pub fn for_conversation(&self, conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            ..self.clone()
        }
    }
}

/// Raw body of a chat reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageResponse {
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub document_created: bool,
    #[serde(default)]
    pub document_title: Option<String>,
    #[serde(default)]
    pub document_content: Option<String>,
    #[serde(default)]
    pub document_format: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub task_created: bool,
    #[serde(default)]
    pub processing_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Text,
    Document(DocumentAttachment),
}

/// Validated assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub conversation_id: Option<String>,
    pub content: String,
    pub body: ReplyBody,
    /// The backend created a planner task as a side effect.
    pub task_created: bool,
    pub processing_time: Option<f64>,
}

impl TryFrom<ChatMessageResponse> for ChatReply {
    type Error = GatewayError;

    fn try_from(raw: ChatMessageResponse) -> Result<Self, Self::Error> {
        let body = if raw.document_created {
            let content = raw.document_content.ok_or_else(|| {
                GatewayError::InvalidResponse(
                    "document_created is set but document_content is missing".to_string(),
                )
            })?;
            let title = raw
                .document_title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED_DOCUMENT.to_string());

            ReplyBody::Document(DocumentAttachment {
                title,
                content,
                format: DocumentFormat::from_wire(raw.document_format.as_deref()),
                document_id: raw.document_id,
            })
        } else {
            if raw.message_type.as_deref() == Some(MessageType::DocumentFile.as_str()) {
                tracing::warn!("Reply typed document_file without a document, treating as text");
            }
            ReplyBody::Text
        };

        Ok(Self {
            conversation_id: raw.conversation_id.filter(|id| !id.is_empty()),
            content: raw.content,
            body,
            task_created: raw.task_created,
            processing_time: raw.processing_time,
        })
    }
}

impl ChatReply {
    /// Assistant message for the store.
    pub fn into_message(self, conversation_id: &str) -> Message {
        match self.body {
            ReplyBody::Text => {
                Message::assistant_text(self.content, conversation_id, self.processing_time)
            }
            ReplyBody::Document(document) => Message::assistant_document(
                self.content,
                document,
                conversation_id,
                self.processing_time,
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationHistoryResponse {
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

/// A message as returned by `GET /chat/conversation/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub document_title: Option<String>,
    #[serde(default)]
    pub document_content: Option<String>,
    #[serde(default)]
    pub document_format: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
}

impl HistoryMessage {
    /// Validate into a domain message. Entries with an unknown role are
    /// dropped; unknown message types fall back to text.
    pub fn into_message(self) -> Option<Message> {
        let role = match self.role.parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!(message_id = ?self.id, error = %e, "Skipping history message");
                return None;
            }
        };

        let message_type = match self.message_type.as_deref() {
            None => MessageType::Text,
            Some(raw) => raw.parse::<MessageType>().unwrap_or_else(|e| {
                tracing::warn!(message_id = ?self.id, error = %e, "Treating message as text");
                MessageType::Text
            }),
        };

        let body = match (message_type, self.document_content) {
            (MessageType::DocumentFile, Some(content)) => MessageBody::Document(DocumentAttachment {
                title: self
                    .document_title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| UNTITLED_DOCUMENT.to_string()),
                content,
                format: DocumentFormat::from_wire(self.document_format.as_deref()),
                document_id: self.document_id,
            }),
            (MessageType::DocumentFile, None) => {
                tracing::warn!(message_id = ?self.id, "Document message without content, treating as text");
                MessageBody::Plain(MessageType::Text)
            }
            (other, _) => MessageBody::Plain(other),
        };

        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        Some(Message::confirmed(
            self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            self.conversation_id,
            role,
            self.content,
            timestamp,
            self.processing_time,
            body,
        ))
    }
}

/// Accepts RFC 3339 and the naive ISO-8601 form the backend emits for UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| tracing::warn!(timestamp = raw, error = %e, "Unparseable timestamp"))
        .ok()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteConversationResponse {
    pub success: bool,
}

/// Aggregate counters from `GET /user/stats/chat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatStats {
    pub total_conversations: u64,
    pub total_messages: u64,
    pub messages_today: u64,
    pub documents_created: u64,
    pub tasks_created: u64,
    pub average_response_time: Option<f64>,
}

/// Body of `POST /api/google/create-formatted-doc`.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct FormattedDocRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
    pub format: DocumentFormat,
    pub preserve_markdown: bool,
}

impl FormattedDocRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>, format: DocumentFormat) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            format,
            preserve_markdown: format == DocumentFormat::Markdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedDoc {
    pub document_id: String,
    pub document_url: String,
    #[serde(default)]
    pub formatted: bool,
    #[serde(default)]
    pub markdown_converted: bool,
}

/// Google account link state from `GET /api/google/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleStatus {
    pub connected: bool,
    #[serde(default)]
    pub email: Option<String>,
}
