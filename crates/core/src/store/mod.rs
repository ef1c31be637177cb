//! Durable key/value storage for state that must survive restarts.
//!
//! The offline queue persists its whole item list as one serialized blob
//! under a fixed key; nothing here interprets the blob.

pub mod sqlite;

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::Error;

pub use sqlite::SqliteStore;

/// Get/set of serialized blobs by key.
#[async_trait::async_trait]
pub trait DurableStore: Send + Sync {
    /// Load the blob stored under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<String>, Error>;

    /// Replace the blob stored under `key`.
    async fn save(&self, key: &str, value: &str) -> Result<(), Error>;
}

/// Process-local store, used in tests and when no database is configured.
///
/// Sharing one instance between two queues models a process restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DurableStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), Error> {
        self.blobs.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
