//! Engine configuration
//!
//! Read once at startup, never re-read. Sources are applied in order:
//! built-in defaults, an optional TOML file, then environment overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub content_store: ContentStoreConfig,
}

/// Resource cache budget and lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Global byte budget across all live entries
    #[serde(default = "default_max_cache_bytes")]
    pub max_bytes: u64,

    /// Interval of the background expiry sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// TTL per resource class
    #[serde(default)]
    pub ttl: TtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_cache_bytes(),
            sweep_interval_secs: default_sweep_interval(),
            ttl: TtlConfig::default(),
        }
    }
}

fn default_max_cache_bytes() -> u64 { 50 * 1024 * 1024 }
fn default_sweep_interval() -> u64 { 300 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "default_api_ttl")]
    pub api_secs: u64,
    #[serde(default = "default_page_ttl")]
    pub page_secs: u64,
    #[serde(default = "default_asset_ttl")]
    pub asset_secs: u64,
    #[serde(default = "default_derived_ttl")]
    pub derived_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            api_secs: default_api_ttl(),
            page_secs: default_page_ttl(),
            asset_secs: default_asset_ttl(),
            derived_secs: default_derived_ttl(),
        }
    }
}

fn default_api_ttl() -> u64 { 5 * 60 }
fn default_page_ttl() -> u64 { 10 * 60 }
fn default_asset_ttl() -> u64 { 60 * 60 }
fn default_derived_ttl() -> u64 { 24 * 60 * 60 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Items per feed request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fixed seed for the diversity sample (None = OS entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            seed: None,
        }
    }
}

fn default_batch_size() -> usize { 20 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Push endpoint URL (unset = always poll)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Per-subscription poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Reconnect delay base; attempt n waits base * 2^n
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,

    /// Consecutive failures before falling back to polling for good
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            poll_interval_ms: default_poll_interval(),
            reconnect_base_ms: default_reconnect_base(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_poll_interval() -> u64 { 1500 }
fn default_reconnect_base() -> u64 { 1000 }
fn default_max_reconnect_attempts() -> u32 { 5 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Critical resources fetched on route entry, keyed by route
    #[serde(default = "default_route_resources")]
    pub routes: HashMap<String, Vec<String>>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            routes: default_route_resources(),
        }
    }
}

fn default_route_resources() -> HashMap<String, Vec<String>> {
    let mut routes = HashMap::new();
    routes.insert(
        "/".to_string(),
        vec!["/api/products".to_string(), "/api/categories".to_string()],
    );
    routes.insert("/cart".to_string(), vec!["/api/cart".to_string()]);
    routes.insert(
        "/notifications".to_string(),
        vec!["/api/notifications".to_string()],
    );
    routes
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for durable local storage (unset = in-memory only)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentStoreConfig {
    /// Base URL the content store paths are resolved against
    #[serde(default = "default_content_url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_content_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

fn default_content_url() -> String { "http://localhost:8080".to_string() }
fn default_request_timeout() -> u64 { 10_000 }

impl EngineConfig {
    /// Load from a TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };

        Ok(config.with_env_overrides())
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(mb) = env_parse::<u64>("CACHE_MAX_MB") {
            self.cache.max_bytes = mb_to_bytes(mb);
        }
        if let Some(secs) = env_parse::<u64>("CACHE_SWEEP_INTERVAL_SECS") {
            self.cache.sweep_interval_secs = secs;
        }
        if let Some(size) = env_parse::<usize>("FEED_BATCH_SIZE") {
            self.ranking.batch_size = size;
        }
        if let Some(seed) = env_parse::<u64>("FEED_SEED") {
            self.ranking.seed = Some(seed);
        }
        if let Ok(url) = std::env::var("LIVE_URL") {
            if !url.trim().is_empty() {
                self.live.endpoint_url = Some(url);
            }
        }
        if let Some(ms) = env_parse::<u64>("LIVE_POLL_INTERVAL_MS") {
            self.live.poll_interval_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("LIVE_RECONNECT_BASE_MS") {
            self.live.reconnect_base_ms = ms;
        }
        if let Some(n) = env_parse::<u32>("LIVE_MAX_RECONNECT_ATTEMPTS") {
            self.live.max_reconnect_attempts = n;
        }
        if let Ok(dir) = std::env::var("STOREFRONT_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(url) = std::env::var("CONTENT_STORE_URL") {
            self.content_store.base_url = url;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ranking.batch_size == 0 {
            return Err(EngineError::Config("ranking.batch_size must be > 0".into()));
        }
        if self.cache.max_bytes == 0 {
            return Err(EngineError::Config("cache.max_bytes must be > 0".into()));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(EngineError::Config("cache.sweep_interval_secs must be > 0".into()));
        }
        if self.live.poll_interval_ms == 0 {
            return Err(EngineError::Config("live.poll_interval_ms must be > 0".into()));
        }
        if self.live.reconnect_base_ms == 0 {
            return Err(EngineError::Config("live.reconnect_base_ms must be > 0".into()));
        }
        Ok(())
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl LiveConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }
}

fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.ranking.batch_size, 20);
        assert_eq!(config.live.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.live.max_reconnect_attempts, 5);
        assert!(config.live.endpoint_url.is_none());
        assert!(config.loader.routes.contains_key("/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let raw = r#"
[cache]
max_bytes = 1024

[cache.ttl]
api_secs = 30

[live]
endpoint_url = "ws://localhost:9000/live"
max_reconnect_attempts = 3

[loader.routes]
"/deals" = ["/api/deals"]
"#;

        let config: EngineConfig = toml::from_str(raw).expect("valid TOML");
        assert_eq!(config.cache.max_bytes, 1024);
        assert_eq!(config.cache.ttl.api_secs, 30);
        // Untouched fields keep their defaults
        assert_eq!(config.cache.ttl.asset_secs, 3600);
        assert_eq!(config.live.max_reconnect_attempts, 3);
        assert_eq!(config.live.poll_interval_ms, 1500);
        assert_eq!(config.loader.routes["/deals"], vec!["/api/deals"]);
        assert_eq!(config.ranking.batch_size, 20);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = EngineConfig::default();
        config.ranking.batch_size = 0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = EngineConfig::default();
        config.cache.sweep_interval_secs = 0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let mut config = EngineConfig::default();
        config.live.reconnect_base_ms = 0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_cache_megabytes_saturate() {
        assert_eq!(mb_to_bytes(64), 64 * 1024 * 1024);
        assert_eq!(mb_to_bytes(u64::MAX), u64::MAX);
    }
}
