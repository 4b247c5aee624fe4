//! betty-chat: conversation session state machine and backend gateway for
//! the Betty chat client.
pub mod models;
pub mod services;

pub use models::message::{DocumentAttachment, DocumentFormat, Message, MessageType, Role};
pub use services::export::{DocumentExporter, ExportProgress, ExportedDocument};
pub use services::gateway::ChatGateway;
pub use services::google_link::{await_google_link, LinkError, LinkPolicy};
pub use services::http_gateway::HttpChatGateway;
pub use services::session::{
    ConversationHandle, Delivery, LoadOutcome, SendFailure, SendOutcome, SessionController,
    SessionState, SkipReason,
};
pub use services::store::MessageStore;
