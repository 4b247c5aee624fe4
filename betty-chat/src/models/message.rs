//! Conversation message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Prefix of client-generated ids for optimistic messages.
pub const PENDING_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Rendering variant of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    DocumentFile,
    TaskCreation,
    CalendarEvent,
    FileAnalysis,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::DocumentFile => "document_file",
            MessageType::TaskCreation => "task_creation",
            MessageType::CalendarEvent => "calendar_event",
            MessageType::FileAnalysis => "file_analysis",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "document_file" => Ok(MessageType::DocumentFile),
            "task_creation" => Ok(MessageType::TaskCreation),
            "calendar_event" => Ok(MessageType::CalendarEvent),
            "file_analysis" => Ok(MessageType::FileAnalysis),
            other => Err(format!("unknown message type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    #[default]
    Markdown,
    Text,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Text => "text",
        }
    }

    /// Unknown or missing formats are treated as markdown.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("text") | Some("plain") => DocumentFormat::Text,
            _ => DocumentFormat::Markdown,
        }
    }
}

/// A document generated by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttachment {
    #[serde(rename = "document_title")]
    pub title: String,
    #[serde(rename = "document_content")]
    pub content: String,
    #[serde(rename = "document_format")]
    pub format: DocumentFormat,
    #[serde(rename = "document_id", skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

/// One turn in a conversation.
///
/// `document` is present exactly when `message_type` is `DocumentFile`;
/// the constructors below are the only way this crate builds messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    /// Seconds the assistant took to produce this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(flatten)]
    pub document: Option<DocumentAttachment>,
    /// Client-generated and not yet confirmed by the backend.
    #[serde(default)]
    pub pending: bool,
}

impl Message {
    /// Optimistic user message shown before the backend confirms it.
    pub fn pending_user(content: impl Into<String>, conversation_id: Option<String>) -> Self {
        Self {
            id: format!("{}{}", PENDING_ID_PREFIX, Uuid::new_v4()),
            conversation_id,
            role: Role::User,
            content: content.into(),
            message_type: MessageType::Text,
            timestamp: Utc::now(),
            processing_time: None,
            document: None,
            pending: true,
        }
    }

    pub fn assistant_text(
        content: impl Into<String>,
        conversation_id: impl Into<String>,
        processing_time: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: Some(conversation_id.into()),
            role: Role::Assistant,
            content: content.into(),
            message_type: MessageType::Text,
            timestamp: Utc::now(),
            processing_time,
            document: None,
            pending: false,
        }
    }

    pub fn assistant_document(
        content: impl Into<String>,
        document: DocumentAttachment,
        conversation_id: impl Into<String>,
        processing_time: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: Some(conversation_id.into()),
            role: Role::Assistant,
            content: content.into(),
            message_type: MessageType::DocumentFile,
            timestamp: Utc::now(),
            processing_time,
            document: Some(document),
            pending: false,
        }
    }

    /// Message loaded from conversation history.
    pub(crate) fn confirmed(
        id: String,
        conversation_id: Option<String>,
        role: Role,
        content: String,
        timestamp: DateTime<Utc>,
        processing_time: Option<f64>,
        body: MessageBody,
    ) -> Self {
        let (message_type, document) = match body {
            MessageBody::Plain(message_type) => (message_type, None),
            MessageBody::Document(document) => (MessageType::DocumentFile, Some(document)),
        };

        Self {
            id,
            conversation_id,
            role,
            content,
            message_type,
            timestamp,
            processing_time,
            document,
            pending: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_document(&self) -> bool {
        self.message_type == MessageType::DocumentFile
    }
}

/// Validated variant payload of a confirmed message.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MessageBody {
    /// Any non-document type.
    Plain(MessageType),
    Document(DocumentAttachment),
}
