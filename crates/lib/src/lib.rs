//! ADK Chat core library: session history, key-value persistence, the proxy client,
//! and the send/health controller used by both the CLI and desktop applications.

pub mod backend;
pub mod config;
pub mod connection;
pub mod controller;
pub mod init;
pub mod message;
pub mod session;
pub mod storage;

pub use backend::{BackendError, ChatBackend, ChatRequest, HealthResponse, HttpBackend};
pub use connection::{ConnectionState, HealthMonitor};
pub use controller::{ChatController, SendOutcome, SendRejected};
pub use message::{Message, Sender};
pub use session::{SessionId, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};

/// Build a controller from config: file-backed storage beside the config and the HTTP backend.
pub fn open_controller(
    config: &config::Config,
    config_path: &std::path::Path,
) -> ChatController<FileStore> {
    let storage = FileStore::new(config::resolve_storage_path(config, config_path));
    let backend = HttpBackend::new(Some(config::resolve_base_url(config)));
    ChatController::new(
        SessionStore::new(storage),
        std::sync::Arc::new(backend),
        config.api.user_id.clone(),
    )
}
