//! Conversation session controller.
//!
//! Owns the message store and session flags for one chat screen and drives
//! the send / load-history state machine against a [`ChatGateway`].
//!
//! State is published through a `watch` channel. Each transition is applied
//! in a single `send_if_modified` closure, so observers never see a failed
//! send's rollback without its error flag or the flag without the rollback.
//!
//! Every request captures the session `generation` when it starts and only
//! applies its result if the generation is unchanged. `start_new` bumps the
//! generation, which turns any in-flight response into a no-op.

use betty_core::error::{ErrorKind, GatewayError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::message::Message;
use crate::models::wire::{ChatReply, SendMessageRequest};
use crate::services::gateway::ChatGateway;
use crate::services::status;
use crate::services::store::MessageStore;

/// How the chat screen was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationHandle {
    /// Fresh chat; the conversation is created by the first send.
    New,
    /// Existing conversation whose history can be loaded.
    Existing(String),
}

/// Snapshot of the session as seen by the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub messages: MessageStore,
    pub conversation_id: Option<String>,
    /// True until the session is bound to a conversation that existed before
    /// it was opened. History is never loaded for new conversations.
    pub is_new: bool,
    pub is_sending: bool,
    pub is_loading_history: bool,
    pub connection_error: bool,
    pub last_error: Option<ErrorKind>,
    #[serde(skip)]
    status_phrases: Option<&'static [&'static str]>,
    #[serde(skip)]
    generation: u64,
}

impl SessionState {
    fn new(handle: ConversationHandle) -> Self {
        let (conversation_id, is_new) = match handle {
            ConversationHandle::New => (None, true),
            ConversationHandle::Existing(id) => (Some(id), false),
        };

        Self {
            messages: MessageStore::new(),
            conversation_id,
            is_new,
            is_sending: false,
            is_loading_history: false,
            connection_error: false,
            last_error: None,
            status_phrases: None,
            generation: 0,
        }
    }

    /// First write wins; a different id arriving later is ignored.
    fn adopt_conversation_id(&mut self, id: &str) {
        match &self.conversation_id {
            None => {
                tracing::info!(conversation_id = %id, "Conversation id adopted");
                self.conversation_id = Some(id.to_string());
            }
            Some(existing) if existing != id => {
                tracing::warn!(
                    conversation_id = %existing,
                    ignored = %id,
                    "Gateway returned a different conversation id, keeping the adopted one"
                );
            }
            Some(_) => {}
        }
    }

    fn raise_error(&mut self, kind: ErrorKind) {
        self.connection_error = true;
        self.last_error = Some(kind);
    }

    fn clear_error(&mut self) {
        self.connection_error = false;
        self.last_error = None;
    }

    /// Whether an operation started in `generation` may still touch state.
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Input was empty after trimming.
    EmptyInput,
    /// A send or history load is already in flight.
    Busy,
}

/// Successful send result.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub conversation_id: String,
    /// The confirmed user message.
    pub user_message: Message,
    pub assistant_message: Message,
    /// The backend created a planner task while answering.
    pub task_created: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Skipped(SkipReason),
    Delivered(Delivery),
    /// The session was reset or closed while the request was in flight; the
    /// response was dropped.
    Discarded,
}

/// A failed send. The optimistic message has already been rolled back.
///
/// `input` is the text the user typed, for refilling the input field or
/// passing to [`SessionController::retry`].
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct SendFailure {
    pub kind: ErrorKind,
    pub error: GatewayError,
    pub input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Number of messages now in the store.
    Loaded(usize),
    /// Preconditions not met (new conversation, no id, or busy).
    Skipped,
    /// The session was reset or closed before the history arrived.
    Discarded,
}

/// Upper bound for one send, covering both calls of a first send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

pub struct SessionController {
    gateway: Arc<dyn ChatGateway>,
    state: watch::Sender<SessionState>,
    shutdown: CancellationToken,
    send_timeout: Duration,
}

impl SessionController {
    pub fn new(gateway: Arc<dyn ChatGateway>, handle: ConversationHandle) -> Self {
        let (state, _) = watch::channel(SessionState::new(handle));
        Self {
            gateway,
            state,
            shutdown: CancellationToken::new(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.as_slice().to_vec()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.state.borrow().conversation_id.clone()
    }

    pub fn is_sending(&self) -> bool {
        self.state.borrow().is_sending
    }

    pub fn is_loading_history(&self) -> bool {
        self.state.borrow().is_loading_history
    }

    pub fn connection_error(&self) -> bool {
        self.state.borrow().connection_error
    }

    /// Typing indicator text while a send is in flight.
    pub fn status_message(&self, tick: usize) -> Option<&'static str> {
        let state = self.state.borrow();
        if !state.is_sending {
            return None;
        }
        state
            .status_phrases
            .map(|phrases| status::phrase_at(phrases, tick))
    }

    /// Fetch the stored history of an existing conversation.
    ///
    /// Failures keep whatever is already in the store and raise
    /// `connection_error`.
    pub async fn load_history(&self) -> Result<LoadOutcome, GatewayError> {
        if self.is_closed() {
            return Ok(LoadOutcome::Discarded);
        }

        let mut started = None;
        self.state.send_if_modified(|s| {
            if s.is_new || s.is_loading_history || s.is_sending {
                return false;
            }
            let Some(id) = s.conversation_id.clone() else {
                return false;
            };
            s.is_loading_history = true;
            started = Some((s.generation, id));
            true
        });

        let Some((generation, conversation_id)) = started else {
            tracing::debug!("History load skipped");
            return Ok(LoadOutcome::Skipped);
        };

        tracing::info!(conversation_id = %conversation_id, "Loading conversation history");

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                self.state.send_if_modified(|s| {
                    if !s.is_current(generation) {
                        return false;
                    }
                    s.is_loading_history = false;
                    true
                });
                tracing::debug!(conversation_id = %conversation_id, "History load abandoned on close");
                return Ok(LoadOutcome::Discarded);
            }
            result = self.gateway.conversation_history(&conversation_id) => result,
        };

        let mut outcome = Ok(LoadOutcome::Discarded);
        self.state.send_if_modified(|s| {
            if !s.is_current(generation) {
                return false;
            }
            s.is_loading_history = false;
            match result {
                Ok(messages) => {
                    s.messages.replace_all(messages);
                    s.clear_error();
                    outcome = Ok(LoadOutcome::Loaded(s.messages.len()));
                }
                Err(err) => {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        kind = %err.kind(),
                        error = %err,
                        "History load failed, keeping current messages"
                    );
                    s.raise_error(err.kind());
                    outcome = Err(err);
                }
            }
            true
        });

        if matches!(outcome, Ok(LoadOutcome::Discarded)) {
            tracing::debug!(conversation_id = %conversation_id, "Stale history response dropped");
        }
        outcome
    }

    /// Send `text` as a user message.
    ///
    /// The optimistic message is in the store before any network call. On
    /// failure it is removed again in the same state transition that raises
    /// `connection_error`.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SendFailure> {
        let content = text.trim();
        if content.is_empty() {
            return Ok(SendOutcome::Skipped(SkipReason::EmptyInput));
        }
        if self.is_closed() {
            tracing::debug!("Send ignored, session is closed");
            return Ok(SendOutcome::Discarded);
        }

        let mut started = None;
        self.state.send_if_modified(|s| {
            if s.is_sending || s.is_loading_history {
                return false;
            }
            let pending = Message::pending_user(content, s.conversation_id.clone());
            started = Some((s.generation, s.conversation_id.clone(), pending.clone()));
            s.messages.append(pending);
            s.is_sending = true;
            s.clear_error();
            s.status_phrases = Some(status::phrases_for(content));
            true
        });

        let Some((generation, conversation_id, pending)) = started else {
            tracing::debug!("Send ignored, another request is in flight");
            return Ok(SendOutcome::Skipped(SkipReason::Busy));
        };

        let pending_id = pending.id.clone();
        tracing::info!(
            conversation_id = ?conversation_id,
            message_id = %pending_id,
            "Sending message"
        );

        let exchange = tokio::time::timeout(
            self.send_timeout,
            self.exchange(conversation_id.as_deref(), content),
        );
        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                // Closing is not a failure: roll back without raising the flag.
                self.state.send_if_modified(|s| {
                    if !s.is_current(generation) {
                        return false;
                    }
                    s.messages.remove_by_id(&pending_id);
                    s.is_sending = false;
                    s.status_phrases = None;
                    true
                });
                tracing::debug!(message_id = %pending_id, "Send abandoned on close");
                return Ok(SendOutcome::Discarded);
            }
            result = exchange => result.unwrap_or(Err(GatewayError::Timeout)),
        };

        let mut outcome = Ok(SendOutcome::Discarded);
        self.state.send_if_modified(|s| {
            if !s.is_current(generation) {
                return false;
            }
            s.is_sending = false;
            s.status_phrases = None;

            match result {
                Ok(reply) => {
                    outcome = Ok(SendOutcome::Delivered(apply_reply(s, pending, reply)));
                }
                Err(err) => {
                    s.messages.remove_by_id(&pending_id);
                    s.raise_error(err.kind());
                    tracing::warn!(
                        message_id = %pending_id,
                        kind = %err.kind(),
                        error = %err,
                        "Send failed, optimistic message rolled back"
                    );
                    outcome = Err(SendFailure {
                        kind: err.kind(),
                        error: err,
                        input: text.to_string(),
                    });
                }
            }
            true
        });

        if matches!(outcome, Ok(SendOutcome::Discarded)) {
            tracing::debug!(message_id = %pending_id, "Stale send response dropped");
        }
        outcome
    }

    /// Resubmit the exact input of a failed send.
    pub async fn retry(&self, failure: &SendFailure) -> Result<SendOutcome, SendFailure> {
        tracing::info!(kind = %failure.kind, "Retrying failed send");
        self.send(&failure.input).await
    }

    /// Hide the error banner without resending.
    pub fn dismiss_error(&self) {
        self.state.send_if_modified(|s| {
            if !s.connection_error && s.last_error.is_none() {
                return false;
            }
            s.clear_error();
            true
        });
    }

    /// Reset to an empty, new conversation.
    ///
    /// Responses to requests started before the reset are dropped when they
    /// arrive.
    pub fn start_new(&self) {
        self.state.send_modify(|s| {
            let generation = s.generation + 1;
            *s = SessionState::new(ConversationHandle::New);
            s.generation = generation;
        });
        tracing::info!("Started new chat");
    }

    /// Delete the current conversation on the backend, then reset.
    ///
    /// A session without a conversation id just resets.
    pub async fn delete_conversation(&self) -> Result<bool, GatewayError> {
        let Some(conversation_id) = self.conversation_id() else {
            self.start_new();
            return Ok(false);
        };

        let deleted = self.gateway.delete_conversation(&conversation_id).await?;
        self.start_new();
        Ok(deleted)
    }

    /// Stop the session. In-flight requests are abandoned and roll back their
    /// optimistic state; later sends and loads return `Discarded` untouched.
    /// Call when the owning screen goes away.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn exchange(
        &self,
        conversation_id: Option<&str>,
        content: &str,
    ) -> Result<ChatReply, GatewayError> {
        match conversation_id {
            Some(id) => {
                self.gateway
                    .send_message(&SendMessageRequest::text(content, Some(id.to_string())))
                    .await
            }
            None => {
                let reply = self
                    .gateway
                    .start_conversation(&SendMessageRequest::text(content, None))
                    .await?;
                if reply.conversation_id.is_none() {
                    return Err(GatewayError::InvalidResponse(
                        "new conversation reply without conversation_id".to_string(),
                    ));
                }
                Ok(reply)
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Reconcile the optimistic message with the reply and append the assistant
/// message.
fn apply_reply(state: &mut SessionState, mut pending: Message, reply: ChatReply) -> Delivery {
    if let Some(id) = reply.conversation_id.as_deref() {
        state.adopt_conversation_id(id);
    }
    // Set by adopt above or before the send started.
    let conversation_id = state.conversation_id.clone().unwrap_or_default();

    state.messages.confirm(&pending.id, &conversation_id);
    pending.pending = false;
    pending.conversation_id = Some(conversation_id.clone());

    let task_created = reply.task_created;
    let assistant_message = reply.into_message(&conversation_id);
    state.messages.append(assistant_message.clone());

    tracing::info!(
        conversation_id = %conversation_id,
        message_type = assistant_message.message_type.as_str(),
        "Assistant message appended"
    );

    Delivery {
        conversation_id,
        user_message: pending,
        assistant_message,
        task_created,
    }
}
