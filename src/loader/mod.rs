//! Resource loader
//!
//! Cache-first fetching from the content store, with preloading driven by
//! UI triggers. Fetches are never cancelled: a result that arrives after the
//! caller stopped caring is still cached.

mod strategy;

pub use strategy::{LoadStrategy, LoadTrigger};

use dashmap::DashSet;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::cache::{ResourceClass, SharedCache};
use crate::config::{LoaderConfig, TtlConfig};
use crate::content::ContentStore;
use crate::error::{EngineError, Result};

pub struct Loader {
    store: Arc<dyn ContentStore>,
    cache: SharedCache,
    ttl: TtlConfig,
    /// Critical resources per route
    routes: HashMap<String, Vec<String>>,
    in_flight: DashSet<String>,
    /// Deferred (non-preload) requests awaiting `drain_queue`
    queue: Mutex<VecDeque<(String, LoadStrategy)>>,
}

/// Marks a URL as in flight until dropped
struct InFlight<'a> {
    set: &'a DashSet<String>,
    url: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.url);
    }
}

impl Loader {
    pub fn new(
        store: Arc<dyn ContentStore>,
        cache: SharedCache,
        ttl: TtlConfig,
        config: &LoaderConfig,
    ) -> Self {
        Self {
            store,
            cache,
            ttl,
            routes: config.routes.clone(),
            in_flight: DashSet::new(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.contains(url)
    }

    pub fn is_queued(&self, url: &str) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(queued, _)| queued == url)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Critical resources configured for a route
    pub fn route_resources(&self, route: &str) -> &[String] {
        self.routes.get(route).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Warm the cache for `url`.
    ///
    /// No-op while the URL is in flight or queued. Preloading strategies
    /// fetch now; `normal` is queued for `drain_queue`; `low` is dropped.
    pub async fn preload(&self, url: &str, strategy: LoadStrategy) {
        if self.is_in_flight(url) || self.is_queued(url) {
            debug!(url = url, "Preload skipped, already pending");
            return;
        }

        if strategy.preload() {
            self.instant_load(url, strategy).await;
            return;
        }

        if !strategy.cache() {
            debug!(url = url, strategy = strategy.as_str(), "Preload ignored");
            return;
        }

        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((url.to_string(), strategy));
        debug!(url = url, strategy = strategy.as_str(), "Preload queued");
    }

    /// Cache-first load.
    ///
    /// Fetch failures and missing resources are logged and come back as
    /// `None`; nothing here is fatal to the caller.
    pub async fn instant_load(&self, url: &str, strategy: LoadStrategy) -> Option<Value> {
        match self.load(url, strategy).await {
            Ok(value) => Some(value),
            Err(EngineError::NotFound(_)) => {
                warn!(url = url, "Resource not found");
                None
            }
            Err(e) => {
                warn!(url = url, error = %e, "Resource fetch failed");
                None
            }
        }
    }

    /// Cache-first load that reports why a resource is unavailable.
    ///
    /// A resource the content store does not have is `NotFound`.
    pub async fn load(&self, url: &str, strategy: LoadStrategy) -> Result<Value> {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url);
        if let Some(value) = cached {
            return Ok(value);
        }

        self.in_flight.insert(url.to_string());
        let _in_flight = InFlight {
            set: &self.in_flight,
            url: url.to_string(),
        };

        let value = self
            .store
            .fetch(url)
            .await?
            .ok_or_else(|| EngineError::NotFound(url.to_string()))?;

        if strategy.cache() {
            let ttl = ResourceClass::for_path(url).ttl(&self.ttl);
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .put(url, &value, ttl);
        }
        Ok(value)
    }

    pub async fn on_trigger(&self, trigger: &LoadTrigger) {
        let strategy = trigger.strategy();
        match trigger {
            LoadTrigger::Hover { url } => self.preload(url, strategy).await,
            LoadTrigger::Viewport { url } => {
                self.instant_load(url, strategy).await;
            }
            LoadTrigger::RouteEntry { route } => {
                let resources = self.route_resources(route);
                info!(route = %route, resources = resources.len(), "Route entry preload");
                join_all(resources.iter().map(|url| self.preload(url, strategy))).await;
            }
        }
    }

    /// Load everything deferred so far, returning how many succeeded
    pub async fn drain_queue(&self) -> usize {
        let pending: Vec<(String, LoadStrategy)> = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        if pending.is_empty() {
            return 0;
        }

        let results = join_all(
            pending
                .iter()
                .map(|(url, strategy)| self.instant_load(url, *strategy)),
        )
        .await;

        let loaded = results.iter().filter(|r| r.is_some()).count();
        debug!(pending = pending.len(), loaded = loaded, "Preload queue drained");
        loaded
    }
}
