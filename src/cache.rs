//! Best-effort offline snapshot of the card mirror.
//!
//! A single fixed key holds the JSON-serialized card list. It is written after every
//! applied card-loading pass, read once at startup as an optimistic initial mirror,
//! and removed when authentication drops. Failures are logged, never propagated.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::Card;

/// Key under which the card snapshot is stored.
pub const CARD_CACHE_KEY: &str = "kanban_cards";

/// Persistent key/value storage backing the offline cache.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Process-local storage, used when no persistent location is wanted.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct OfflineCache {
    storage: Arc<dyn CacheStorage>,
}

impl OfflineCache {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::default()))
    }

    /// Overwrites the snapshot with `cards`. Failures are logged only.
    pub async fn save(&self, cards: &[Card]) {
        let serialized = match serde_json::to_string(cards) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize card snapshot: {}", e);
                return;
            }
        };
        match self.storage.write(CARD_CACHE_KEY, &serialized).await {
            Ok(()) => debug!("Cached {} card(s) for offline use", cards.len()),
            Err(e) => warn!("Failed to write offline card cache: {}", e),
        }
    }

    /// Reads the snapshot. A missing or unreadable snapshot yields no cards.
    pub async fn load(&self) -> Vec<Card> {
        let raw = match self.storage.read(CARD_CACHE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read offline card cache: {}", e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<Card>>(&raw) {
            Ok(cards) => cards,
            Err(e) => {
                warn!("Discarding corrupt offline card cache: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn purge(&self) {
        if let Err(e) = self.storage.remove(CARD_CACHE_KEY).await {
            warn!("Failed to purge offline card cache: {}", e);
        }
    }
}
