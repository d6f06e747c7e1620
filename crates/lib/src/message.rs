//! Chat messages as shown in the transcript and persisted under `adkMessages`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

/// One transcript entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// True only for failure messages synthesized by the client.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp,
            is_error: false,
        }
    }

    pub fn agent(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender: Sender::Agent,
            text: text.into(),
            timestamp,
            is_error: false,
        }
    }

    /// Agent-side bubble explaining a failed send.
    pub fn error(reason: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender: Sender::Agent,
            text: failure_text(reason),
            timestamp,
            is_error: true,
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }

    /// Local wall-clock time as `HH:MM`.
    pub fn time_label(&self) -> String {
        self.timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string()
    }
}

/// User-facing diagnostic for a failed send, listing the usual misconfigurations.
pub fn failure_text(reason: &str) -> String {
    format!(
        "❌ Sorry, something went wrong: {}\n\n\
         Make sure:\n\
         1. The ADK server is running on port 8000\n\
         2. The proxy server is running on port 3001\n\
         3. The API key is set in backend-adk/.env",
        reason
    )
}
