//! Resource cache
//!
//! One byte-budgeted TTL cache shared by the loader and the engine context.
//! Lifetimes are picked per resource class; a background task sweeps
//! expired entries on a fixed interval.

mod resource;

pub use resource::{CacheStats, ResourceCache};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::TtlConfig;

/// Cache handle shared between components. The lock is never held across
/// an `.await`.
pub type SharedCache = Arc<Mutex<ResourceCache>>;

pub fn shared(max_bytes: u64) -> SharedCache {
    Arc::new(Mutex::new(ResourceCache::new(max_bytes)))
}

/// Kind of resource, which decides how long it stays cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// JSON API responses (`/api/...`)
    Api,
    /// Page documents
    Page,
    /// Images, fonts, scripts and stylesheets
    Asset,
    /// Payloads computed locally from other resources (`derived:...`)
    Derived,
}

const ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "woff", "woff2", "ttf", "otf",
    "js", "mjs", "css",
];

impl ResourceClass {
    pub fn for_path(path: &str) -> Self {
        if path.starts_with("derived:") {
            return ResourceClass::Derived;
        }

        // Ignore query and fragment
        let path = path.split(['?', '#']).next().unwrap_or(path);

        if path.starts_with("/api/") || path == "/api" {
            return ResourceClass::Api;
        }

        let is_asset = path
            .rsplit('/')
            .next()
            .and_then(|segment| segment.rsplit_once('.'))
            .is_some_and(|(_, ext)| ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));

        if is_asset {
            ResourceClass::Asset
        } else {
            ResourceClass::Page
        }
    }

    pub fn ttl(&self, config: &TtlConfig) -> Duration {
        let secs = match self {
            ResourceClass::Api => config.api_secs,
            ResourceClass::Page => config.page_secs,
            ResourceClass::Asset => config.asset_secs,
            ResourceClass::Derived => config.derived_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Api => "api",
            ResourceClass::Page => "page",
            ResourceClass::Asset => "asset",
            ResourceClass::Derived => "derived",
        }
    }
}

/// Periodically drop expired entries.
///
/// The returned handle owns the task; abort it to stop sweeping.
pub fn spawn_sweep_task(cache: SharedCache, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Resource cache sweep task started");

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let (expired, stats) = {
                let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
                let expired = cache.sweep();
                (expired, cache.stats())
            };
            debug!(
                expired = expired,
                entries = stats.entries,
                total_bytes = stats.total_bytes,
                hit_rate = format!("{:.1}%", stats.hit_rate()),
                "Resource cache sweep completed"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_class_for_path() {
        assert_eq!(ResourceClass::for_path("/api/products"), ResourceClass::Api);
        assert_eq!(ResourceClass::for_path("/api/cart?x=1"), ResourceClass::Api);
        assert_eq!(ResourceClass::for_path("/img/logo.PNG"), ResourceClass::Asset);
        assert_eq!(ResourceClass::for_path("/static/app.js"), ResourceClass::Asset);
        assert_eq!(ResourceClass::for_path("/product/42"), ResourceClass::Page);
        assert_eq!(ResourceClass::for_path("/v1.2/about"), ResourceClass::Page);
        assert_eq!(ResourceClass::for_path("derived:feed"), ResourceClass::Derived);
    }

    #[test]
    fn test_ttl_per_class() {
        let ttl = TtlConfig::default();
        assert_eq!(ResourceClass::Api.ttl(&ttl), Duration::from_secs(300));
        assert_eq!(ResourceClass::Page.ttl(&ttl), Duration::from_secs(600));
        assert_eq!(ResourceClass::Asset.ttl(&ttl), Duration::from_secs(3600));
        assert_eq!(ResourceClass::Derived.ttl(&ttl), Duration::from_secs(86400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_drops_expired() {
        let cache = shared(1024);
        cache
            .lock()
            .unwrap()
            .put("/api/a", &json!(1), Duration::from_secs(5));

        let handle = spawn_sweep_task(cache.clone(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(cache.lock().unwrap().len(), 0);
        assert_eq!(cache.lock().unwrap().stats().expirations, 1);
        handle.abort();
    }
}
