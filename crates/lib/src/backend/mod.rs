//! Backend proxy abstraction and HTTP client.
//!
//! The proxy exposes `GET /health` (proxy and ADK server readiness) and `POST /chat`
//! (one agent turn). [`ChatBackend`] lets the controller run against a fake in tests.

mod http;

pub use http::{BackendError, ChatRequest, HealthResponse, HttpBackend};

use async_trait::async_trait;

/// Remote agent reachable through the proxy.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// GET /health.
    async fn health(&self) -> Result<HealthResponse, BackendError>;

    /// POST /chat; returns the agent's reply text.
    async fn chat(&self, request: &ChatRequest) -> Result<String, BackendError>;
}
