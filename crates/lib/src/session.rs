//! Conversation session and message history.
//!
//! One active session at a time: its id and ordered history live in memory and are mirrored
//! to a [`KeyValueStore`] after every change, so a restart resumes the same conversation.

use crate::message::Message;
use crate::storage::{KeyValueStore, StorageError};

/// Storage key for the active session id.
pub const SESSION_ID_KEY: &str = "adkSessionId";
/// Storage key for the JSON-encoded message history.
pub const HISTORY_KEY: &str = "adkMessages";

/// Unique session identifier (opaque string).
pub type SessionId = String;

/// Generate a random 36-character id in the 8-4-4-4-12 layout (version 4, RFC 4122 variant).
pub fn generate_session_id() -> SessionId {
    uuid::Uuid::new_v4().hyphenated().to_string()
}

/// First eight characters of an id, as shown in status bars.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Owner of the active session id and its append-only history.
pub struct SessionStore<S> {
    storage: S,
    session_id: Option<SessionId>,
    messages: Vec<Message>,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            session_id: None,
            messages: Vec::new(),
        }
    }

    /// Restore the persisted session, or create and persist a new one.
    pub fn initialize(&mut self) -> Result<(SessionId, Vec<Message>), StorageError> {
        let stored = self
            .storage
            .get(SESSION_ID_KEY)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        match stored {
            Some(id) => {
                self.messages = self.load_history();
                log::debug!(
                    "restored session {} with {} message(s)",
                    id,
                    self.messages.len()
                );
                self.session_id = Some(id);
            }
            None => {
                self.messages.clear();
                let id = self.start_session()?;
                log::info!("created session {}", id);
            }
        }
        Ok((self.session_id.clone().unwrap_or_default(), self.messages.clone()))
    }

    /// Append a message and persist the whole history. Persistence is best-effort: a failed
    /// write is logged and the in-memory history is still returned.
    pub fn append_message(&mut self, message: Message) -> &[Message] {
        self.messages.push(message);
        if let Err(e) = self.save_history() {
            log::warn!("failed to persist message history: {}", e);
        }
        &self.messages
    }

    /// Drop the history and the session id, then start a fresh session. Returns the new id.
    pub fn clear(&mut self) -> Result<SessionId, StorageError> {
        self.messages.clear();
        self.session_id = None;
        self.storage.delete(HISTORY_KEY)?;
        self.storage.delete(SESSION_ID_KEY)?;
        let id = self.start_session()?;
        log::info!("cleared history, new session {}", id);
        Ok(id)
    }

    /// Active session id; None until [`SessionStore::initialize`] succeeds.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn start_session(&mut self) -> Result<SessionId, StorageError> {
        let id = generate_session_id();
        self.storage.set(SESSION_ID_KEY, &id)?;
        self.session_id = Some(id.clone());
        Ok(id)
    }

    /// Persisted history, or empty when absent or undecodable.
    fn load_history(&self) -> Vec<Message> {
        let raw = match self.storage.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::warn!("failed to read message history, starting empty: {}", e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("discarding malformed message history: {}", e);
                Vec::new()
            }
        }
    }

    fn save_history(&self) -> Result<(), StorageError> {
        let json = serde_json::to_string(&self.messages)?;
        self.storage.set(HISTORY_KEY, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Store whose writes always fail.
    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }

        fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    fn is_v4_layout(id: &str) -> bool {
        let bytes = id.as_bytes();
        if bytes.len() != 36 {
            return false;
        }
        for (i, b) in bytes.iter().enumerate() {
            let expect_hyphen = matches!(i, 8 | 13 | 18 | 23);
            if expect_hyphen != (*b == b'-') {
                return false;
            }
            if !expect_hyphen && !matches!(b, b'0'..=b'9' | b'a'..=b'f') {
                return false;
            }
        }
        bytes[14] == b'4' && matches!(bytes[19], b'8' | b'9' | b'a' | b'b')
    }

    #[test]
    fn generated_ids_have_v4_layout() {
        for _ in 0..100 {
            let id = generate_session_id();
            assert!(is_v4_layout(&id), "bad id {}", id);
        }
    }

    #[test]
    fn short_id_takes_first_eight_chars() {
        assert_eq!(short_id("0123abcd-4567-4abc-8def-0123456789ab"), "0123abcd");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn initialize_creates_and_persists_new_session() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = SessionStore::new(storage.clone());
        assert!(store.session_id().is_none());

        let (id, history) = store.initialize().unwrap();
        assert!(is_v4_layout(&id));
        assert!(history.is_empty());
        assert_eq!(store.session_id(), Some(id.as_str()));
        assert_eq!(storage.get(SESSION_ID_KEY).unwrap(), Some(id));
    }

    #[test]
    fn initialize_restores_session_and_history() {
        let storage = Arc::new(MemoryStore::new());
        let mut first = SessionStore::new(storage.clone());
        let (id, _) = first.initialize().unwrap();
        first.append_message(Message::user("Hello", Utc::now()));
        first.append_message(Message::agent("Hi there", Utc::now()));

        let mut second = SessionStore::new(storage);
        let (restored_id, history) = second.initialize().unwrap();
        assert_eq!(restored_id, id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "Hello");
        assert_eq!(history[1].text, "Hi there");
        assert_eq!(second.history(), first.history());
    }

    #[test]
    fn initialize_with_malformed_history_starts_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(SESSION_ID_KEY, "existing-session").unwrap();
        storage.set(HISTORY_KEY, "{not valid json").unwrap();

        let mut store = SessionStore::new(storage);
        let (id, history) = store.initialize().unwrap();
        assert_eq!(id, "existing-session");
        assert!(history.is_empty());

        store.append_message(Message::user("after", Utc::now()));
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn initialize_recovers_from_truncated_storage_file() {
        let path = std::env::temp_dir()
            .join(format!("adkchat-session-test-{}", uuid::Uuid::new_v4()))
            .join("storage.json");
        let mut first = SessionStore::new(FileStore::new(&path));
        let (old, _) = first.initialize().unwrap();
        first.append_message(Message::user("Hello", Utc::now()));
        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..raw.len() / 2]).unwrap();

        let mut second = SessionStore::new(FileStore::new(&path));
        let (id, history) = second.initialize().unwrap();
        assert_ne!(id, old);
        assert!(history.is_empty());
        second.append_message(Message::user("again", Utc::now()));
        let cleared = second.clear().unwrap();
        assert_ne!(cleared, id);

        let mut third = SessionStore::new(FileStore::new(&path));
        let (restored, history) = third.initialize().unwrap();
        assert_eq!(restored, cleared);
        assert!(history.is_empty());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn initialize_treats_blank_id_as_absent() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(SESSION_ID_KEY, "  ").unwrap();
        let mut store = SessionStore::new(storage);
        let (id, _) = store.initialize().unwrap();
        assert!(is_v4_layout(&id));
    }

    #[test]
    fn append_persists_full_history_in_order() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = SessionStore::new(storage.clone());
        store.initialize().unwrap();
        store.append_message(Message::user("one", Utc::now()));
        let history = store.append_message(Message::agent("two", Utc::now()));
        assert_eq!(history.len(), 2);

        let raw = storage.get(HISTORY_KEY).unwrap().unwrap();
        let persisted: Vec<Message> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted, store.history());
        assert_eq!(persisted[0].text, "one");
        assert_eq!(persisted[1].text, "two");
    }

    #[test]
    fn append_survives_storage_failure() {
        let inner = MemoryStore::new();
        inner.set(SESSION_ID_KEY, "s1").unwrap();
        let mut store = SessionStore::new(ReadOnlyStore(inner));
        store.initialize().unwrap();
        let history = store.append_message(Message::user("kept in memory", Utc::now()));
        assert_eq!(history.len(), 1);
        assert_eq!(store.history()[0].text, "kept in memory");
    }

    #[test]
    fn clear_resets_history_and_rotates_id() {
        let storage = Arc::new(MemoryStore::new());
        let mut store = SessionStore::new(storage.clone());
        let (old, _) = store.initialize().unwrap();
        store.append_message(Message::user("bye", Utc::now()));

        let new = store.clear().unwrap();
        assert_ne!(new, old);
        assert!(store.history().is_empty());
        assert_eq!(store.session_id(), Some(new.as_str()));
        assert_eq!(storage.get(SESSION_ID_KEY).unwrap(), Some(new));
        assert_eq!(storage.get(HISTORY_KEY).unwrap(), None);
    }

    #[test]
    fn clear_never_repeats_an_id() {
        let mut store = SessionStore::new(MemoryStore::new());
        let (mut previous, _) = store.initialize().unwrap();
        let mut seen = HashSet::new();
        seen.insert(previous.clone());
        for _ in 0..1000 {
            let id = store.clear().unwrap();
            assert_ne!(id, previous);
            assert!(seen.insert(id.clone()), "duplicate id {}", id);
            assert!(store.history().is_empty());
            previous = id;
        }
    }

    #[test]
    fn clear_propagates_storage_failure() {
        let inner = MemoryStore::new();
        inner.set(SESSION_ID_KEY, "s1").unwrap();
        let mut store = SessionStore::new(ReadOnlyStore(inner));
        store.initialize().unwrap();
        assert!(store.clear().is_err());
    }
}
