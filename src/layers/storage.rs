//! Key/value store that stands in for browser local storage.
//!
//! Each key is one JSON file under the data directory. Writes replace the whole
//! file atomically and announce the key on an in-process broadcast channel.
//! Nothing crosses process boundaries: another process sharing the directory
//! only sees changes when it reads again.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const USER_KEY: &str = "user";
pub const COLLECTIONS_KEY: &str = "collections";
pub const SUBJECTS_KEY: &str = "subjects";
pub const PROFILE_UPDATE_TIME_KEY: &str = "profile_update_time";

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
    events: broadcast::Sender<StorageEvent>,
}

impl LocalStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory {:?}", dir))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self { dir, events })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Receives one event per write or removal made through this handle or its clones.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read storage key `{}`", key)),
        }
    }

    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let mut temp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to create temp file in {:?}", self.dir))?;
        temp.write_all(value.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        temp.flush()
            .with_context(|| format!("Failed to flush {}", path.display()))?;
        temp.persist(&path)
            .with_context(|| format!("Failed to persist {}", path.display()))?;
        tracing::debug!("Stored key `{}` ({} bytes)", key, value.len());
        self.notify(key);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove storage key `{}`", key))
            }
        }
        self.notify(key);
        Ok(())
    }

    /// Reads and parses a key. Missing keys and unparsable blobs both yield `None`;
    /// the latter is logged.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Ignoring unparsable value under `{}`: {}", key, e);
                Ok(None)
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for `{}`", key))?;
        self.set_raw(key, &raw)
    }

    fn notify(&self, key: &str) {
        // No receivers is fine; the send error only reports that.
        let _ = self.events.send(StorageEvent { key: key.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_and_missing_key() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();

        assert!(storage.get_raw(USER_KEY).unwrap().is_none());
        storage.set_json(USER_KEY, &vec![1, 2, 3]).unwrap();
        let back: Option<Vec<i32>> = storage.get_json(USER_KEY).unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_corrupt_blob_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.set_raw(COLLECTIONS_KEY, "{not json").unwrap();
        let parsed: Option<Vec<i32>> = storage.get_json(COLLECTIONS_KEY).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_writes_and_removals_are_broadcast() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let mut rx = storage.subscribe();

        storage.set_raw(ACCESS_TOKEN_KEY, "\"t\"").unwrap();
        storage.clone().remove(ACCESS_TOKEN_KEY).unwrap();
        storage.remove(ACCESS_TOKEN_KEY).unwrap();

        assert_eq!(rx.try_recv().unwrap().key, ACCESS_TOKEN_KEY);
        assert_eq!(rx.try_recv().unwrap().key, ACCESS_TOKEN_KEY);
        assert!(rx.try_recv().is_err());
        assert!(storage.get_raw(ACCESS_TOKEN_KEY).unwrap().is_none());
    }
}
