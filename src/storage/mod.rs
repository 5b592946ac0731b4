//! Durable local storage
//!
//! A plain string key → string value store, the shape of browser local
//! storage. Values are opaque to the store; callers serialize to JSON and treat
//! a missing or unparseable value as "no data".

mod file;

pub use file::FileStore;

use dashmap::DashMap;

use crate::error::Result;

/// Key under which the interaction log is persisted
pub const INTERACTION_LOG_KEY: &str = "interactions:log";

/// Namespace for persisted item snapshots
pub const ITEM_SNAPSHOT_PREFIX: &str = "catalog:item:";

/// Build the namespaced key for an item snapshot
pub fn item_snapshot_key(item_id: &str) -> String {
    format!("{ITEM_SNAPSHOT_PREFIX}{item_id}")
}

/// String key/value store used for everything that must survive a restart.
///
/// Operations are synchronous so that an append-and-persist sequence can run
/// as one step without yielding to the scheduler.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Every stored key starting with `prefix`, in no particular order
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// Volatile store, used in tests and when no data directory is configured
#[derive(Default)]
pub struct MemoryStore {
    values: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.values
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
