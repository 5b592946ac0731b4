//! Storefront engine
//!
//! Client-side engine of the storefront: decides what a user sees next,
//! keeps a bounded cache of fetched resources, and delivers live updates.
//!
//! ## Components
//!
//! - **Interaction log**: capped (100) history of user actions, persisted to
//!   local storage after every append
//! - **Affinity profile**: category/price/rating summary derived lazily from
//!   the log
//! - **Ranking engine**: bounded per-term scoring and 70/30 trending/diverse
//!   feed batches
//! - **Resource cache**: JSON payloads under a global byte budget with
//!   per-class TTL and oldest-first eviction
//! - **Loader**: strategy-tagged, cache-first fetching driven by hover,
//!   viewport and route triggers
//! - **Live channel**: shared push connection with exponential backoff and
//!   per-subscription polling fallback
//!
//! `EngineContext` wires one instance of each together from `EngineConfig`.
//!
//! ```text
//! Content Store ──► Loader ──► ResourceCache
//!                     │
//!                     ▼
//!        candidates ──► RankingEngine ◄── AffinityProfile ◄── InteractionLog
//!
//! Push endpoint ──► LiveChannel ──► subscription callbacks
//!                        └── poll ──► Content Store
//! ```

pub mod cache;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod interaction;
pub mod live;
pub mod loader;
pub mod ranking;
pub mod storage;

pub use cache::{CacheStats, ResourceCache, ResourceClass, SharedCache};
pub use config::EngineConfig;
pub use content::{ContentItem, ContentStore, HttpContentStore, MemoryContentStore};
pub use context::EngineContext;
pub use error::{EngineError, Result};
pub use interaction::{AffinityProfile, Interaction, InteractionKind, InteractionLog};
pub use live::{ChannelState, LiveChannel, SubscriptionId, Topic};
pub use loader::{LoadStrategy, LoadTrigger, Loader};
pub use ranking::{RankingEngine, ReasonTag, ScoredItem};
pub use storage::{FileStore, LocalStore, MemoryStore};
