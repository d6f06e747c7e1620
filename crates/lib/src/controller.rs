//! Send lifecycle and connection tracking for one chat window.
//!
//! A send is `idle -> sending -> idle`: the user message is appended before the request goes
//! out, and exactly one agent reply or error bubble is appended when it completes. Front ends
//! that cannot hold `&mut` across an await (egui) drive the two halves themselves with
//! [`ChatController::begin_send`] and [`ChatController::finish_send`].

use crate::backend::{BackendError, ChatBackend, ChatRequest};
use crate::connection::{self, ConnectionState, HealthMonitor};
use crate::message::Message;
use crate::session::{SessionId, SessionStore};
use crate::storage::{KeyValueStore, StorageError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Why a send was not started. History is untouched in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    #[error("message is empty")]
    Empty,
    #[error("a message is already being sent")]
    Busy,
    #[error("no session established")]
    NoSession,
}

/// Result of one accepted send.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The agent answered; carries the appended reply.
    Replied(Message),
    /// The request failed; carries the appended error bubble.
    Failed(Message),
}

impl SendOutcome {
    pub fn message(&self) -> &Message {
        match self {
            SendOutcome::Replied(m) | SendOutcome::Failed(m) => m,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SendOutcome::Failed(_))
    }
}

pub struct ChatController<S> {
    store: SessionStore<S>,
    backend: Arc<dyn ChatBackend>,
    user_id: String,
    busy: bool,
    input: String,
    connection: Arc<watch::Sender<ConnectionState>>,
    monitor: Option<HealthMonitor>,
}

impl<S: KeyValueStore> ChatController<S> {
    pub fn new(store: SessionStore<S>, backend: Arc<dyn ChatBackend>, user_id: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::default());
        Self {
            store,
            backend,
            user_id: user_id.into(),
            busy: false,
            input: String::new(),
            connection: Arc::new(tx),
            monitor: None,
        }
    }

    /// Restore or create the session. Sends are rejected until this succeeds.
    pub fn initialize(&mut self) -> Result<(SessionId, Vec<Message>), StorageError> {
        self.store.initialize()
    }

    /// One health probe; the result replaces the current connection state.
    pub async fn probe_health(&self) -> ConnectionState {
        let state = connection::probe(self.backend.as_ref()).await;
        self.connection.send_replace(state);
        state
    }

    /// Start periodic probing (first probe runs immediately). Replaces any running monitor.
    /// Must be called from within a tokio runtime.
    pub fn start_health_monitor(&mut self, interval: Duration) {
        self.monitor = Some(HealthMonitor::spawn(
            self.backend.clone(),
            interval,
            self.connection.clone(),
        ));
    }

    /// Stop periodic probing. Also happens when the controller is dropped.
    pub fn stop_health_monitor(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Receiver notified on every probe result.
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn session_id(&self) -> Option<&str> {
        self.store.session_id()
    }

    pub fn history(&self) -> &[Message] {
        self.store.history()
    }

    pub fn backend(&self) -> Arc<dyn ChatBackend> {
        self.backend.clone()
    }

    /// Whether a send would currently be accepted for `text`.
    pub fn can_send(&self, text: &str) -> bool {
        self.check_send(text).is_ok()
    }

    /// Validate, append the user message, clear the input, and mark busy. Returns the request
    /// the caller must issue and hand back to [`ChatController::finish_send`].
    pub fn begin_send(&mut self, raw: &str) -> Result<ChatRequest, SendRejected> {
        let session_id = self.check_send(raw)?.to_string();
        let text = raw.trim().to_string();
        let timestamp = self.next_timestamp();
        self.store.append_message(Message::user(text.clone(), timestamp));
        self.input.clear();
        self.busy = true;
        log::debug!("sending message in session {}", session_id);
        Ok(ChatRequest {
            session_id,
            message: text,
            user_id: self.user_id.clone(),
        })
    }

    /// Append the reply or error bubble for the in-flight send and return to idle.
    pub fn finish_send(&mut self, result: Result<String, BackendError>) -> SendOutcome {
        let timestamp = self.next_timestamp();
        let outcome = match result {
            Ok(text) => {
                let reply = Message::agent(text, timestamp);
                self.store.append_message(reply.clone());
                SendOutcome::Replied(reply)
            }
            Err(e) => {
                log::error!("send failed: {}", e);
                let bubble = Message::error(&e.reason(), timestamp);
                self.store.append_message(bubble.clone());
                SendOutcome::Failed(bubble)
            }
        };
        self.busy = false;
        outcome
    }

    /// Full send cycle: one request, no retry.
    pub async fn send(&mut self, raw: &str) -> Result<SendOutcome, SendRejected> {
        let request = self.begin_send(raw)?;
        let result = self.backend.chat(&request).await;
        Ok(self.finish_send(result))
    }

    /// Send the current input buffer.
    pub async fn submit(&mut self) -> Result<SendOutcome, SendRejected> {
        let text = self.input.clone();
        self.send(&text).await
    }

    /// Clear history and start a new session. Refused while a send is in flight.
    pub fn clear(&mut self) -> Result<Option<SessionId>, StorageError> {
        if self.busy {
            log::warn!("clear ignored while a message is being sent");
            return Ok(None);
        }
        self.store.clear().map(Some)
    }

    fn check_send<'a>(&'a self, raw: &str) -> Result<&'a str, SendRejected> {
        if raw.trim().is_empty() {
            return Err(SendRejected::Empty);
        }
        if self.busy {
            return Err(SendRejected::Busy);
        }
        self.store.session_id().ok_or(SendRejected::NoSession)
    }

    /// Now, but never earlier than the last message so history stays time-ordered.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.store.last_message() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }
}
