//! Flat key-value persistence for session id and message history.
//!
//! `FileStore` keeps every key in one JSON object on disk, the way a browser keeps
//! local storage per origin. `MemoryStore` backs tests and runs without a home directory.

use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// String-keyed persistence with get/set/delete.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + Sync + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file. Writes go to a sibling temp file that is then
/// renamed over the target, under an exclusive lock on `<file>.lock`, so a CLI and a desktop
/// instance sharing one file never see a half-written object.
///
/// A file that does not parse is moved aside to `<file>.corrupt-<timestamp>` and treated as
/// empty.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

type Entries = serde_json::Map<String, serde_json::Value>;

/// Advisory lock held for the guard's lifetime.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "storage.json".to_string());
        self.path.with_file_name(format!("{}{}", name, suffix))
    }

    fn ensure_parent(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn lock(&self, exclusive: bool) -> Result<LockGuard, StorageError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.sibling(".lock"))?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(LockGuard { file })
    }

    /// Current entries; the caller holds the lock.
    fn load(&self) -> Result<Entries, StorageError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Entries::new());
        }
        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let aside = self.sibling(&format!(
                    ".corrupt-{}",
                    chrono::Utc::now().format("%Y%m%d%H%M%S%3f")
                ));
                log::warn!(
                    "storage file {} is not a JSON object ({}), moving it to {} and starting empty",
                    self.path.display(),
                    e,
                    aside.display()
                );
                match std::fs::rename(&self.path, &aside) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Ok(Entries::new())
            }
        }
    }

    fn read_all(&self) -> Result<Entries, StorageError> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }
        let _lock = self.lock(false)?;
        self.load()
    }

    /// Read-modify-write under an exclusive lock, replacing the file by rename.
    fn update(&self, f: impl FnOnce(&mut Entries)) -> Result<(), StorageError> {
        self.ensure_parent()?;
        let _lock = self.lock(true)?;
        let mut entries = self.load()?;
        f(&mut entries);
        let json = serde_json::to_string_pretty(&entries)?;

        let tmp_path = self.sibling(".tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(json.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.read_all()?;
        Ok(entries.get(key).and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        })
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("adkchat-storage-test-{}", uuid::Uuid::new_v4()))
            .join("storage.json")
    }

    #[test]
    fn memory_store_get_set_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.set("k", "w").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("w"));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_missing_file_reads_empty() {
        let store = FileStore::new(temp_store_path());
        assert_eq!(store.get("adkSessionId").unwrap(), None);
        store.delete("adkSessionId").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let path = temp_store_path();
        let store = FileStore::new(&path);
        store.set("adkSessionId", "abc").unwrap();
        store.set("adkMessages", "[]").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("adkSessionId").unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("adkMessages").unwrap().as_deref(), Some("[]"));

        reopened.delete("adkSessionId").unwrap();
        assert_eq!(store.get("adkSessionId").unwrap(), None);
        assert_eq!(store.get("adkMessages").unwrap().as_deref(), Some("[]"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn file_store_shorter_write_leaves_no_trailing_bytes() {
        let path = temp_store_path();
        let store = FileStore::new(&path);
        store.set("adkMessages", &"x".repeat(512)).unwrap();
        store.set("adkMessages", "[]").unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["adkMessages"], "[]");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    fn corrupt_siblings(path: &Path) -> usize {
        std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .count()
    }

    #[test]
    fn file_store_moves_corrupt_file_aside() {
        let path = temp_store_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        let store = FileStore::new(&path);
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!path.exists());
        assert_eq!(corrupt_siblings(&path), 1);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn file_store_recovers_from_truncated_write() {
        let path = temp_store_path();
        let store = FileStore::new(&path);
        store.set("adkSessionId", "abc").unwrap();
        store.set("adkMessages", &"[\"a long history entry\"]".repeat(4)).unwrap();
        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..raw.len() / 2]).unwrap();

        store.set("adkSessionId", "def").unwrap();
        assert_eq!(store.get("adkSessionId").unwrap().as_deref(), Some("def"));
        assert_eq!(store.get("adkMessages").unwrap(), None);
        assert_eq!(corrupt_siblings(&path), 1);
        assert!(!path.with_file_name("storage.json.tmp").exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
