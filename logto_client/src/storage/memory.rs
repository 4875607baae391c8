//! An in-memory storage backend

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Storage, StorageKey};
use crate::BoxError;

/// Storage that lives only as long as the process
///
/// Useful for machine-only clients and for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<StorageKey, String>>,
}

impl MemoryStorage {
    /// Constructs a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: StorageKey) -> Result<Option<String>, BoxError> {
        Ok(self.items.read().await.get(&key).cloned())
    }

    async fn set_item(&self, key: StorageKey, value: &str) -> Result<(), BoxError> {
        self.items.write().await.insert(key, value.to_owned());
        Ok(())
    }
}
