//! Content store clients

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::ContentStoreConfig;
use crate::error::{EngineError, Result};

/// Read interface of the content store.
///
/// `Ok(None)` means the path does not exist (404-equivalent). Transport
/// failures are `Err`; callers decide whether to swallow them.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Option<Value>>;
}

/// HTTP content store, resolving paths against a base URL
pub struct HttpContentStore {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpContentStore {
    pub fn new(config: &ContentStoreConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn fetch(&self, path: &str) -> Result<Option<Value>> {
        let url = self.url_for(path);
        debug!(url = %url, "Content store GET");

        let response = self.http_client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Network(format!("HTTP {} - {}", status, body)));
        }

        let value: Value = response.json().await?;
        Ok(Some(value))
    }
}

/// In-memory content store for tests and offline demos.
///
/// Paths marked as failing return a network error, and every fetch is
/// counted so callers can assert cache behaviour.
#[derive(Default)]
pub struct MemoryContentStore {
    documents: DashMap<String, Value>,
    failing: DashSet<String>,
    requests: AtomicU64,
    latency: Option<Duration>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency` (tokio time)
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn insert(&self, path: impl Into<String>, value: Value) {
        self.documents.insert(path.into(), value);
    }

    pub fn remove(&self, path: &str) {
        self.documents.remove(path);
    }

    /// Make every fetch of `path` fail with a network error
    pub fn fail(&self, path: impl Into<String>) {
        self.failing.insert(path.into());
    }

    pub fn recover(&self, path: &str) {
        self.failing.remove(path);
    }

    /// Number of fetches served (including failures)
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn fetch(&self, path: &str) -> Result<Option<Value>> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.contains(path) {
            return Err(EngineError::Network(format!("simulated failure for {path}")));
        }

        Ok(self.documents.get(path).map(|v| v.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_url_joining() {
        let store = HttpContentStore::new(&ContentStoreConfig {
            base_url: "http://shop.local/".to_string(),
            request_timeout_ms: 1000,
        })
        .unwrap();

        assert_eq!(store.base_url(), "http://shop.local");
        assert_eq!(store.url_for("/api/products"), "http://shop.local/api/products");
        assert_eq!(store.url_for("api/cart"), "http://shop.local/api/cart");
    }

    #[tokio::test]
    async fn test_memory_store_fetch() {
        let store = MemoryContentStore::new();
        store.insert("/api/cart", serde_json::json!({"count": 2}));

        let value = store.fetch("/api/cart").await.unwrap();
        assert_eq!(value, Some(serde_json::json!({"count": 2})));
        assert_eq!(store.fetch("/missing").await.unwrap(), None);

        store.fail("/api/cart");
        assert!(matches!(
            store.fetch("/api/cart").await,
            Err(EngineError::Network(_))
        ));
        assert_eq!(store.request_count(), 3);
    }
}
