//! Engine context
//!
//! Composition root: builds one instance of every component from
//! configuration and wires them together. Independent contexts share no
//! state, so tests can run several side by side.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{self, SharedCache};
use crate::config::EngineConfig;
use crate::content::{ContentItem, ContentStore, HttpContentStore};
use crate::error::{EngineError, Result};
use crate::interaction::{
    AffinityProfile, Interaction, InteractionKind, InteractionLog, ProfileCache, LOG_CAPACITY,
};
use crate::live::{LiveChannel, PushConnector, SubscriptionId, Topic};
use crate::loader::{LoadStrategy, Loader};
use crate::ranking::{RankingEngine, ScoredItem};
use crate::storage::{item_snapshot_key, FileStore, LocalStore, MemoryStore, ITEM_SNAPSHOT_PREFIX};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct EngineContext {
    config: EngineConfig,
    local: Arc<dyn LocalStore>,
    cache: SharedCache,
    loader: Loader,
    log: Mutex<InteractionLog>,
    profile: Mutex<ProfileCache>,
    ranking: Mutex<RankingEngine>,
    /// Every item seen as a feed candidate this session
    catalog: DashMap<String, ContentItem>,
    live: LiveChannel,
    sweep: Mutex<Option<JoinHandle<()>>>,
}

impl EngineContext {
    /// Build from configuration: file-backed storage if a data directory is
    /// set, HTTP content store at the configured base URL.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let local: Arc<dyn LocalStore> = match &config.storage.data_dir {
            Some(dir) => Arc::new(FileStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        let store: Arc<dyn ContentStore> = Arc::new(HttpContentStore::new(&config.content_store)?);

        Ok(Self::with_parts(config, local, store))
    }

    /// Build around caller-supplied stores. Restores the interaction log.
    pub fn with_parts(
        config: EngineConfig,
        local: Arc<dyn LocalStore>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let cache = cache::shared(config.cache.max_bytes);
        let loader = Loader::new(
            store.clone(),
            cache.clone(),
            config.cache.ttl.clone(),
            &config.loader,
        );
        let log = InteractionLog::load(local.clone());
        prune_snapshots(local.as_ref(), &log);
        let ranking = RankingEngine::from_config(&config.ranking);
        let live = LiveChannel::new(store, config.live.clone());

        info!(
            restored_interactions = log.len(),
            max_cache_bytes = config.cache.max_bytes,
            batch_size = config.ranking.batch_size,
            "Engine context ready"
        );

        Self {
            config,
            local,
            cache,
            loader,
            log: Mutex::new(log),
            profile: Mutex::new(ProfileCache::new()),
            ranking: Mutex::new(ranking),
            catalog: DashMap::new(),
            live,
            sweep: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn live(&self) -> &LiveChannel {
        &self.live
    }

    /// Start background work: cache sweep and the live connection
    pub fn start(&self) {
        self.start_sweep();
        self.live.start();
    }

    /// Like `start`, with an explicit push transport
    pub fn start_with(&self, connector: Arc<dyn PushConnector>) {
        self.start_sweep();
        self.live.start_with(connector);
    }

    fn start_sweep(&self) {
        let mut sweep = lock(&self.sweep);
        if sweep.is_none() {
            *sweep = Some(cache::spawn_sweep_task(
                self.cache.clone(),
                self.config.cache.sweep_interval(),
            ));
        }
    }

    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.sweep).take() {
            handle.abort();
        }
        self.live.shutdown();
    }

    /// Make items resolvable for profile refreshes. Items the log already
    /// references get a snapshot so they stay resolvable after a restart.
    pub fn register_items(&self, items: &[ContentItem]) {
        let referenced: HashSet<String> = lock(&self.log)
            .entries()
            .map(|i| i.item_id.clone())
            .collect();
        for item in items {
            if referenced.contains(item.id.as_str())
                && self.local.get(&item_snapshot_key(&item.id)).is_none()
            {
                if let Err(e) = self.persist_snapshot(item) {
                    warn!(item_id = %item.id, error = %e, "Failed to persist item snapshot");
                }
            }
            self.catalog.insert(item.id.clone(), item.clone());
        }
    }

    /// Record a user action. Never fails; storage errors are logged.
    ///
    /// Snapshots are kept only for items the log still references.
    pub fn record(&self, item_id: &str, kind: InteractionKind) -> Interaction {
        let (interaction, dropped) = {
            let mut log = lock(&self.log);
            let oldest = if log.len() >= LOG_CAPACITY {
                log.oldest().map(|i| i.item_id.clone())
            } else {
                None
            };
            let interaction = log.record(item_id, kind);
            let dropped = oldest.filter(|id| log.entries().all(|i| &i.item_id != id));
            (interaction, dropped)
        };

        if let Some(item) = self.catalog.get(item_id) {
            if let Err(e) = self.persist_snapshot(&item) {
                warn!(item_id = item_id, error = %e, "Failed to persist item snapshot");
            }
        }
        if let Some(id) = dropped {
            if let Err(e) = self.local.remove(&item_snapshot_key(&id)) {
                warn!(item_id = %id, error = %e, "Failed to remove item snapshot");
            }
        }

        debug!(item_id = item_id, kind = kind.as_str(), "Interaction recorded");
        interaction
    }

    fn persist_snapshot(&self, item: &ContentItem) -> Result<()> {
        let raw = serde_json::to_string(item)?;
        self.local.set(&item_snapshot_key(&item.id), &raw)
    }

    fn lookup_item(&self, item_id: &str) -> Option<ContentItem> {
        if let Some(item) = self.catalog.get(item_id) {
            return Some(item.clone());
        }
        let raw = self.local.get(&item_snapshot_key(item_id))?;
        serde_json::from_str(&raw).ok()
    }

    /// Current profile, brought up to date with the log
    pub fn profile(&self) -> AffinityProfile {
        let log = lock(&self.log);
        let mut profile = lock(&self.profile);
        let applied = profile.refresh(&log, |id| self.lookup_item(id));
        if applied > 0 {
            debug!(applied = applied, "Affinity profile refreshed");
        }
        profile.profile().clone()
    }

    pub fn interaction_count(&self) -> usize {
        lock(&self.log).len()
    }

    pub fn score(&self, item: &ContentItem) -> ScoredItem {
        let profile = self.profile();
        lock(&self.ranking).score(item, &profile)
    }

    /// Rank `candidates` into one batch of the configured size
    pub fn build_feed(&self, candidates: &[ContentItem]) -> Vec<ScoredItem> {
        self.build_feed_with(candidates, self.config.ranking.batch_size)
    }

    pub fn build_feed_with(&self, candidates: &[ContentItem], batch_size: usize) -> Vec<ScoredItem> {
        self.register_items(candidates);
        let profile = self.profile();
        lock(&self.ranking).build_feed(candidates, batch_size, &profile)
    }

    /// Load candidates from the content store (cache first) and rank them.
    ///
    /// An unreachable or malformed candidate list yields an empty feed.
    pub async fn feed_from_store(&self, path: &str) -> Vec<ScoredItem> {
        let Some(value) = self.loader.instant_load(path, LoadStrategy::Critical).await else {
            return Vec::new();
        };

        match parse_candidates(value) {
            Ok(candidates) => self.build_feed(&candidates),
            Err(e) => {
                warn!(path = path, error = %e, "Unusable candidate list");
                Vec::new()
            }
        }
    }

    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> SubscriptionId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.live.subscribe(topic, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.live.unsubscribe(id)
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweep
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Drop snapshots of items the log no longer references
fn prune_snapshots(local: &dyn LocalStore, log: &InteractionLog) {
    let referenced: HashSet<&str> = log.entries().map(|i| i.item_id.as_str()).collect();
    let mut removed = 0;
    for key in local.keys_with_prefix(ITEM_SNAPSHOT_PREFIX) {
        let Some(id) = key.strip_prefix(ITEM_SNAPSHOT_PREFIX) else {
            continue;
        };
        if referenced.contains(id) {
            continue;
        }
        match local.remove(&key) {
            Ok(()) => removed += 1,
            Err(e) => warn!(key = %key, error = %e, "Failed to remove item snapshot"),
        }
    }
    if removed > 0 {
        debug!(removed = removed, "Pruned stale item snapshots");
    }
}

/// Accept a bare array of items or an object with an `items` array
fn parse_candidates(value: Value) -> Result<Vec<ContentItem>> {
    match value {
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        Value::Object(mut map) => match map.remove("items") {
            Some(items @ Value::Array(_)) => Ok(serde_json::from_value(items)?),
            _ => Err(EngineError::Serialization(
                "candidate object has no items array".into(),
            )),
        },
        _ => Err(EngineError::Serialization(
            "candidate list must be an array".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContentStore;
    use serde_json::json;

    fn context(store: Arc<MemoryContentStore>) -> (EngineContext, Arc<MemoryStore>) {
        let local = Arc::new(MemoryStore::new());
        let mut config = EngineConfig::default();
        config.ranking.seed = Some(11);
        (EngineContext::with_parts(config, local.clone(), store), local)
    }

    #[test]
    fn test_parse_candidates_shapes() {
        let bare = json!([{"id": "a", "category": "x", "price": 1.0}]);
        let wrapped = json!({"items": [{"id": "b"}]});

        assert_eq!(parse_candidates(bare).unwrap()[0].id, "a");
        assert_eq!(parse_candidates(wrapped).unwrap()[0].id, "b");
        assert!(parse_candidates(json!({"data": []})).is_err());
        assert!(parse_candidates(json!("nope")).is_err());
    }

    #[tokio::test]
    async fn test_record_persists_snapshot_for_known_item() {
        let (ctx, local) = context(Arc::new(MemoryContentStore::new()));
        let item = ContentItem::new("p1", "electronics", 120.0);
        ctx.register_items(&[item.clone()]);

        ctx.record("p1", InteractionKind::Like);
        ctx.record("unknown", InteractionKind::View);

        assert!(local.get(&item_snapshot_key("p1")).is_some());
        assert!(local.get(&item_snapshot_key("unknown")).is_none());
        assert_eq!(ctx.interaction_count(), 2);
        assert_eq!(ctx.profile().weight_for("electronics"), 5);
    }

    #[tokio::test]
    async fn test_feed_from_store() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert(
            "/api/products",
            json!([
                {"id": "a", "category": "books", "price": 10.0, "viewCount": 500},
                {"id": "b", "category": "books", "price": 12.0},
            ]),
        );
        let (ctx, _) = context(store.clone());

        let feed = ctx.feed_from_store("/api/products").await;
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].item.id, "a");

        // Second call is served from the cache
        ctx.feed_from_store("/api/products").await;
        assert_eq!(store.request_count(), 1);

        assert!(ctx.feed_from_store("/api/missing").await.is_empty());
    }

    #[tokio::test]
    async fn test_item_registered_after_record_counts() {
        let (ctx, local) = context(Arc::new(MemoryContentStore::new()));

        ctx.record("p1", InteractionKind::CartAdd);
        assert_eq!(ctx.profile().weight_for("electronics"), 0);

        ctx.register_items(&[ContentItem::new("p1", "electronics", 499.0)]);
        assert_eq!(ctx.profile().weight_for("electronics"), 8);
        assert!(local.get(&item_snapshot_key("p1")).is_some());

        // No double counting on later refreshes
        assert_eq!(ctx.profile().weight_for("electronics"), 8);
    }

    #[tokio::test]
    async fn test_snapshots_follow_the_log() {
        let (ctx, local) = context(Arc::new(MemoryContentStore::new()));
        let items: Vec<ContentItem> = (0..LOG_CAPACITY + 40)
            .map(|i| ContentItem::new(format!("p{i}"), "books", 10.0))
            .collect();
        ctx.register_items(&items);

        for item in &items {
            ctx.record(&item.id, InteractionKind::View);
        }

        assert_eq!(local.keys_with_prefix(ITEM_SNAPSHOT_PREFIX).len(), LOG_CAPACITY);
        assert!(local.get(&item_snapshot_key("p0")).is_none());
        assert!(local.get(&item_snapshot_key("p39")).is_none());
        assert!(local.get(&item_snapshot_key("p40")).is_some());
    }

    #[tokio::test]
    async fn test_repeat_item_keeps_snapshot_when_oldest_drops() {
        let (ctx, local) = context(Arc::new(MemoryContentStore::new()));
        ctx.register_items(&[ContentItem::new("fav", "garden", 30.0)]);

        for _ in 0..=LOG_CAPACITY {
            ctx.record("fav", InteractionKind::View);
        }
        assert!(local.get(&item_snapshot_key("fav")).is_some());
    }

    #[test]
    fn test_startup_prunes_orphaned_snapshots() {
        let local = Arc::new(MemoryStore::new());
        local.set(&item_snapshot_key("gone"), "{}").unwrap();

        let _ctx = EngineContext::with_parts(
            EngineConfig::default(),
            local.clone(),
            Arc::new(MemoryContentStore::new()),
        );

        assert!(local.keys_with_prefix(ITEM_SNAPSHOT_PREFIX).is_empty());
    }
}
