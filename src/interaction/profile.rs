//! User affinity profile
//!
//! A running summary of the interaction log: how much weight each category
//! has accumulated, which price band the user browses, and the average rating
//! of what they interact with. Always derivable from the log; kept as a cache
//! and brought up to date lazily before scoring.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::{Interaction, InteractionLog, LOG_CAPACITY};
use crate::content::ContentItem;

/// Amount the price band grows past an out-of-band price
pub const PRICE_MARGIN: f64 = 500.0;

/// Inclusive price band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn contains(&self, price: f64) -> bool {
        self.min <= price && price <= self.max
    }
}

impl Default for PriceRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1000.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffinityProfile {
    pub price_range: PriceRange,
    pub category_weight: HashMap<String, u32>,
    pub average_rating_preference: f64,
    /// Ratings folded into the running average
    pub rating_samples: u32,
}

impl AffinityProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated weight for a category, 0 if never seen
    pub fn weight_for(&self, category: &str) -> u32 {
        self.category_weight.get(category).copied().unwrap_or(0)
    }

    /// Category with the highest accumulated weight
    pub fn top_category(&self) -> Option<&str> {
        self.category_weight
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(category, _)| category.as_str())
    }
}

/// Fold one interaction into a profile.
///
/// Pure: returns the updated profile and leaves the input untouched. This is
/// the only way a profile changes.
pub fn apply_to_profile(
    profile: &AffinityProfile,
    interaction: &Interaction,
    item: &ContentItem,
) -> AffinityProfile {
    let mut next = profile.clone();

    *next
        .category_weight
        .entry(item.category.clone())
        .or_insert(0) += interaction.kind.weight();

    if item.price < next.price_range.min {
        next.price_range.min = (item.price - PRICE_MARGIN).max(0.0);
    }
    if item.price > next.price_range.max {
        next.price_range.max = item.price + PRICE_MARGIN;
    }

    let samples = f64::from(next.rating_samples);
    next.average_rating_preference =
        (next.average_rating_preference * samples + item.rating) / (samples + 1.0);
    next.rating_samples += 1;

    next
}

/// Profile plus the log watermark it has been brought up to.
///
/// Interactions whose item could not be resolved stay pending and are retried
/// on every refresh, so an item that becomes known later still contributes.
#[derive(Debug, Default)]
pub struct ProfileCache {
    profile: AffinityProfile,
    watermark: u64,
    pending: VecDeque<Interaction>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&self) -> &AffinityProfile {
        &self.profile
    }

    /// Interactions still waiting for their item to resolve
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// True when the log holds interactions not yet folded in
    pub fn is_stale(&self, log: &InteractionLog) -> bool {
        log.appended() > self.watermark || !self.pending.is_empty()
    }

    /// Apply every pending interaction that now resolves, then everything
    /// appended since the last refresh.
    ///
    /// Items are resolved through `lookup`. Unresolved interactions are kept
    /// for the next refresh (at most `LOG_CAPACITY`, oldest dropped). Returns
    /// the number of interactions applied.
    pub fn refresh<F>(&mut self, log: &InteractionLog, lookup: F) -> usize
    where
        F: Fn(&str) -> Option<ContentItem>,
    {
        if !self.is_stale(log) {
            return 0;
        }

        let retry = std::mem::take(&mut self.pending);
        let mut applied = 0;
        for interaction in retry.iter().chain(log.since(self.watermark)) {
            match lookup(&interaction.item_id) {
                Some(item) => {
                    self.profile = apply_to_profile(&self.profile, interaction, &item);
                    applied += 1;
                }
                None => {
                    debug!(item_id = %interaction.item_id, "Deferring interaction for unknown item");
                    self.pending.push_back(interaction.clone());
                }
            }
        }
        while self.pending.len() > LOG_CAPACITY {
            self.pending.pop_front();
        }

        self.watermark = log.appended();
        applied
    }
}
