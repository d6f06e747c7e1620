//! Proxy API client (http://localhost:3001 by default).

use super::ChatBackend;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "http://localhost:3001";

/// Reason used when a failed response carries neither `details` nor `error`.
const GENERIC_FAILURE: &str = "Network error";

/// Client for the proxy HTTP API.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{reason}")]
    Api {
        status: reqwest::StatusCode,
        reason: String,
    },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl BackendError {
    /// Text shown to the user inside the error bubble.
    pub fn reason(&self) -> String {
        match self {
            BackendError::Api { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    pub user_id: String,
}

/// Body of `GET /health`. Any JSON value is well-formed; a field that is missing or not a
/// string reads as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub adk_server: String,
}

impl HealthResponse {
    pub fn from_json(body: &Value) -> Self {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            status: field("status"),
            adk_server: field("adkServer"),
        }
    }

    /// Proxy is up and reports the ADK server as connected.
    pub fn is_ready(&self) -> bool {
        self.status == "ok" && self.adk_server == "connected"
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    response: ChatReplyBody,
}

#[derive(Debug, Deserialize)]
struct ChatReplyBody {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl ErrorBody {
    /// `details`, else `error`, else the generic label.
    fn into_reason(self) -> String {
        self.details
            .filter(|s| !s.is_empty())
            .or(self.error.filter(|s| !s.is_empty()))
            .unwrap_or_else(|| GENERIC_FAILURE.to_string())
    }
}

impl HttpBackend {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn health(&self) -> Result<HealthResponse, BackendError> {
        let url = format!("{}/health", self.base_url);
        let res = self.client.get(&url).send().await?;
        let body = res.text().await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(HealthResponse::from_json(&value))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let url = format!("{}/chat", self.base_url);
        let res = self.client.post(&url).json(request).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ErrorBody>(&body)
                .unwrap_or_default()
                .into_reason();
            log::debug!("chat request failed with {}: {}", status, reason);
            return Err(BackendError::Api { status, reason });
        }
        let body = res.text().await?;
        let reply: ChatReply =
            serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(reply.response.text)
    }
}
