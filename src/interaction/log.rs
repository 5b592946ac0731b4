//! Capped, persisted interaction log

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Interaction, InteractionKind};
use crate::error::Result;
use crate::storage::{LocalStore, INTERACTION_LOG_KEY};

/// Most recent interactions kept; older ones are dropped first
pub const LOG_CAPACITY: usize = 100;

/// Append-only interaction history, flushed to local storage after every
/// append.
///
/// `appended` counts every record ever made in this session (plus whatever was
/// restored), so consumers can track what they have already seen with a
/// watermark even after old entries were trimmed.
pub struct InteractionLog {
    entries: VecDeque<Interaction>,
    appended: u64,
    store: Arc<dyn LocalStore>,
}

impl InteractionLog {
    /// Empty log backed by `store`
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            entries: VecDeque::with_capacity(LOG_CAPACITY + 1),
            appended: 0,
            store,
        }
    }

    /// Restore the log from local storage.
    ///
    /// Absent or corrupt data yields an empty log; this never fails.
    pub fn load(store: Arc<dyn LocalStore>) -> Self {
        let mut log = Self::new(store);

        let Some(raw) = log.store.get(INTERACTION_LOG_KEY) else {
            debug!("No persisted interaction log");
            return log;
        };

        match serde_json::from_str::<Vec<Interaction>>(&raw) {
            Ok(mut restored) => {
                if restored.len() > LOG_CAPACITY {
                    restored.drain(..restored.len() - LOG_CAPACITY);
                }
                log.appended = restored.len() as u64;
                log.entries = restored.into();
                debug!(entries = log.entries.len(), "Interaction log restored");
            }
            Err(e) => {
                warn!(error = %e, "Corrupt interaction log, starting empty");
            }
        }

        log
    }

    /// Record an interaction now
    pub fn record(&mut self, item_id: impl Into<String>, kind: InteractionKind) -> Interaction {
        self.record_at(item_id, kind, Utc::now())
    }

    /// Record an interaction with an explicit timestamp.
    ///
    /// Append, trim and persist happen in one synchronous step. A persistence
    /// failure keeps the in-memory log and is only logged.
    pub fn record_at(
        &mut self,
        item_id: impl Into<String>,
        kind: InteractionKind,
        timestamp: DateTime<Utc>,
    ) -> Interaction {
        let interaction = Interaction {
            item_id: item_id.into(),
            kind,
            timestamp,
        };

        self.entries.push_back(interaction.clone());
        while self.entries.len() > LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.appended += 1;

        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist interaction log");
        }

        interaction
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.entries)?;
        self.store.set(INTERACTION_LOG_KEY, &raw)
    }

    /// Entries from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &Interaction> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of interactions appended (or restored)
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Entries appended at or after the `watermark`-th append that are still
    /// in the log
    pub fn since(&self, watermark: u64) -> impl Iterator<Item = &Interaction> {
        let first_retained = self.appended - self.entries.len() as u64;
        let skip = watermark.saturating_sub(first_retained) as usize;
        self.entries.iter().skip(skip)
    }

    pub fn newest(&self) -> Option<&Interaction> {
        self.entries.back()
    }

    pub fn oldest(&self) -> Option<&Interaction> {
        self.entries.front()
    }
}
