//! Feed batch assembly

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::debug;

use super::score::{score_breakdown, ScoredItem};
use crate::config::RankingConfig;
use crate::content::ContentItem;
use crate::interaction::AffinityProfile;

/// Slots filled from the top of the ranking: `ceil(0.7 * batch_size)`
pub fn trending_count(batch_size: usize) -> usize {
    (batch_size * 7).div_ceil(10)
}

/// Slots sampled from the rest: `ceil(0.3 * batch_size)`
pub fn diversity_count(batch_size: usize) -> usize {
    (batch_size * 3).div_ceil(10)
}

/// Scores candidates and builds feed batches for one session.
///
/// Remembers which items it has already returned so their novelty bonus is
/// dropped in later batches. The diversity sample draws from an owned
/// `StdRng`, seeded from OS entropy unless a seed is given.
pub struct RankingEngine {
    seen: HashSet<String>,
    rng: StdRng,
}

impl RankingEngine {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic diversity sampling
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            seen: HashSet::new(),
            rng,
        }
    }

    pub fn from_config(config: &RankingConfig) -> Self {
        match config.seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        }
    }

    /// Whether the item was part of a batch returned this session
    pub fn has_seen(&self, item_id: &str) -> bool {
        self.seen.contains(item_id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Forget returned items (new session)
    pub fn reset_session(&mut self) {
        self.seen.clear();
    }

    pub fn score(&self, item: &ContentItem, profile: &AffinityProfile) -> ScoredItem {
        self.score_at(item, profile, Utc::now())
    }

    pub fn score_at(
        &self,
        item: &ContentItem,
        profile: &AffinityProfile,
        now: DateTime<Utc>,
    ) -> ScoredItem {
        let breakdown = score_breakdown(item, profile, self.has_seen(&item.id), now);
        ScoredItem::new(item.clone(), breakdown)
    }

    pub fn build_feed(
        &mut self,
        candidates: &[ContentItem],
        batch_size: usize,
        profile: &AffinityProfile,
    ) -> Vec<ScoredItem> {
        self.build_feed_at(candidates, batch_size, profile, Utc::now())
    }

    /// Assemble one batch.
    ///
    /// With no more candidates than `batch_size`, every candidate is returned
    /// by descending score (ties keep input order). Otherwise the top
    /// `trending_count` items are followed by a random sample of
    /// `diversity_count` from the remainder. A remainder smaller than the
    /// sample leaves the batch short; it is not padded.
    pub fn build_feed_at(
        &mut self,
        candidates: &[ContentItem],
        batch_size: usize,
        profile: &AffinityProfile,
        now: DateTime<Utc>,
    ) -> Vec<ScoredItem> {
        if batch_size == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<ScoredItem> = candidates
            .iter()
            .map(|item| self.score_at(item, profile, now))
            .collect();
        // sort_by is stable
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let batch = if ranked.len() <= batch_size {
            ranked
        } else {
            let trending = trending_count(batch_size);
            let remainder = ranked.split_off(trending);

            let diversity: Vec<ScoredItem> = remainder
                .choose_multiple(&mut self.rng, diversity_count(batch_size))
                .cloned()
                .collect();

            debug!(
                candidates = candidates.len(),
                trending = ranked.len(),
                diversity = diversity.len(),
                "Feed batch assembled"
            );

            ranked.extend(diversity);
            ranked.truncate(batch_size);
            ranked
        };

        for scored in &batch {
            self.seen.insert(scored.item.id.clone());
        }

        batch
    }
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn catalog(n: usize, now: DateTime<Utc>) -> Vec<ContentItem> {
        // Item i is i days old, so item-0 scores highest
        (0..n)
            .map(|i| {
                ContentItem::new(format!("item-{i}"), "misc", 10.0)
                    .with_created_at(now - Duration::days(i as i64))
            })
            .collect()
    }

    #[test]
    fn test_split_counts() {
        assert_eq!(trending_count(10), 7);
        assert_eq!(diversity_count(10), 3);
        assert_eq!(trending_count(20), 14);
        assert_eq!(diversity_count(20), 6);
        assert_eq!(trending_count(3), 3);
        assert_eq!(diversity_count(3), 1);
        assert_eq!(trending_count(1), 1);
    }

    #[test]
    fn test_small_catalog_sorted() {
        let now = Utc::now();
        let mut items = catalog(4, now);
        items.reverse();

        let mut engine = RankingEngine::with_seed(7);
        let feed = engine.build_feed_at(&items, 10, &AffinityProfile::new(), now);

        assert_eq!(feed.len(), 4);
        let ids: Vec<_> = feed.iter().map(|s| s.item.id.as_str()).collect();
        assert_eq!(ids, vec!["item-0", "item-1", "item-2", "item-3"]);
        assert!(feed.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let now = Utc::now();
        let items: Vec<_> = ["b", "a", "c"]
            .iter()
            .map(|id| ContentItem::new(*id, "misc", 10.0).with_created_at(now))
            .collect();

        let mut engine = RankingEngine::with_seed(1);
        let feed = engine.build_feed_at(&items, 5, &AffinityProfile::new(), now);
        let ids: Vec<_> = feed.iter().map(|s| s.item.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_large_catalog_exact_batch() {
        let now = Utc::now();
        let items = catalog(30, now);

        let mut engine = RankingEngine::with_seed(42);
        let feed = engine.build_feed_at(&items, 10, &AffinityProfile::new(), now);

        assert_eq!(feed.len(), 10);
        let trending: Vec<_> = feed[..7].iter().map(|s| s.item.id.clone()).collect();
        let expected: Vec<_> = (0..7).map(|i| format!("item-{i}")).collect();
        assert_eq!(trending, expected);

        // Diversity items come from below the trending cut
        for scored in &feed[7..] {
            assert!(!expected.contains(&scored.item.id));
        }
    }

    #[test]
    fn test_oversized_catalog_fills_batch() {
        let now = Utc::now();
        // Just past the batch size the remainder still covers the sample
        for batch_size in 1..=25 {
            let items = catalog(batch_size + 1, now);
            let mut engine = RankingEngine::with_seed(3);
            let feed = engine.build_feed_at(&items, batch_size, &AffinityProfile::new(), now);
            assert_eq!(feed.len(), batch_size, "batch_size {batch_size}");

            let mut ids: Vec<_> = feed.iter().map(|s| s.item.id.clone()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), batch_size);
        }
    }

    #[test]
    fn test_same_seed_same_batch() {
        let now = Utc::now();
        let items = catalog(40, now);
        let profile = AffinityProfile::new();

        let a = RankingEngine::with_seed(99).build_feed_at(&items, 10, &profile, now);
        let b = RankingEngine::with_seed(99).build_feed_at(&items, 10, &profile, now);

        let ids = |feed: &[ScoredItem]| feed.iter().map(|s| s.item.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_returned_items_lose_novelty() {
        let now = Utc::now();
        let items = catalog(3, now);
        let profile = AffinityProfile::new();

        let mut engine = RankingEngine::with_seed(5);
        let before = engine.score_at(&items[0], &profile, now);
        engine.build_feed_at(&items[..1], 5, &profile, now);
        let after = engine.score_at(&items[0], &profile, now);

        assert!(engine.has_seen("item-0"));
        assert!(!engine.has_seen("item-1"));
        assert_eq!(before.score - after.score, 5.0);

        engine.reset_session();
        assert_eq!(engine.seen_count(), 0);
    }

    #[test]
    fn test_zero_batch() {
        let now = Utc::now();
        let mut engine = RankingEngine::with_seed(5);
        assert!(engine
            .build_feed_at(&catalog(5, now), 0, &AffinityProfile::new(), now)
            .is_empty());
        assert_eq!(engine.seen_count(), 0);
    }
}
