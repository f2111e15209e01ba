//! Key-value cache stores.
//!
//! Keys are opaque strings; values are JSON wrapped in a small envelope that
//! records when they were written. Nothing expires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

/// A stored value with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stored<T> {
    /// When the value was written
    pub created_at: DateTime<Utc>,
    pub value: T,
}

impl<T> Stored<T> {
    pub fn new(value: T) -> Self {
        Self {
            created_at: Utc::now(),
            value,
        }
    }
}

/// Atomic per-key get/set over raw bytes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Number of entries held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Read and decode a value written by [`save`].
pub async fn load<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<Stored<T>>, StorageError> {
    match store.get(key).await? {
        Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
        None => Ok(None),
    }
}

/// Encode and write a value; the previous value for `key` is replaced.
pub async fn save<T: Serialize>(store: &dyn CacheStore, key: &str, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_vec(&Stored::new(value))?;
    store.set(key, data).await
}

/// Sled-based on-disk store.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

#[async_trait]
impl CacheStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key.as_bytes())?.map(|data| data.to_vec()))
    }

    /// The insert and its flush run on the blocking pool.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            db.insert(key.as_bytes(), value)?;
            db.flush()?;
            Ok(())
        })
        .await?
    }

    fn len(&self) -> usize {
        self.db.len()
    }

    fn name(&self) -> &'static str {
        "sled"
    }
}

/// In-process store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
