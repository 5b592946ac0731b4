//! Feed ranking integration tests

use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use storefront_engine::ranking::trending_count;
use storefront_engine::{
    AffinityProfile, ContentItem, EngineConfig, EngineContext, InteractionKind,
    MemoryContentStore, MemoryStore, RankingEngine,
};

fn test_context() -> EngineContext {
    let mut config = EngineConfig::default();
    config.ranking.seed = Some(2024);
    EngineContext::with_parts(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryContentStore::new()),
    )
}

/// Varied catalog: ages, views and ratings differ per item
fn catalog(n: usize) -> Vec<ContentItem> {
    let now = Utc::now();
    (0..n)
        .map(|i| {
            ContentItem::new(format!("item-{i}"), ["books", "toys", "garden"][i % 3], 20.0 + i as f64)
                .with_created_at(now - Duration::hours((i * 7 % 500) as i64))
                .with_views((i as u64 * 37) % 130)
                .with_rating((i % 6) as f64 * 0.9)
        })
        .collect()
}

#[test]
fn test_newer_item_beats_older_by_freshness_gap() {
    let now = Utc::now();
    let engine = RankingEngine::with_seed(1);
    let profile = AffinityProfile::new();

    let p = ContentItem::new("p", "books", 30.0)
        .with_created_at(now)
        .with_views(100)
        .with_rating(4.0);
    let q = ContentItem::new("q", "books", 30.0)
        .with_created_at(now - Duration::days(30))
        .with_views(100)
        .with_rating(4.0);

    let p_scored = engine.score_at(&p, &profile, now);
    let q_scored = engine.score_at(&q, &profile, now);

    assert_eq!(p_scored.breakdown.freshness, 40.0);
    assert_eq!(q_scored.breakdown.freshness, 0.0);
    assert!((p_scored.score - q_scored.score - 40.0).abs() < 1e-9);
}

#[test]
fn test_freshness_monotonic_in_age() {
    let now = Utc::now();
    let engine = RankingEngine::with_seed(1);
    let profile = AffinityProfile::new();

    let mut previous = f64::INFINITY;
    for hours in [0, 6, 24, 48, 24 * 10, 24 * 19, 24 * 20, 24 * 40] {
        let item = ContentItem::new("x", "c", 1.0).with_created_at(now - Duration::hours(hours));
        let freshness = engine.score_at(&item, &profile, now).breakdown.freshness;
        assert!(freshness <= previous, "age {hours}h");
        previous = freshness;
    }

    // One full day apart is a strict decrease while inside the window
    let younger = ContentItem::new("y", "c", 1.0).with_created_at(now - Duration::days(2));
    let older = ContentItem::new("o", "c", 1.0).with_created_at(now - Duration::days(3));
    assert!(
        engine.score_at(&younger, &profile, now).breakdown.freshness
            > engine.score_at(&older, &profile, now).breakdown.freshness
    );
}

#[test]
fn test_like_raises_category_affinity() {
    let ctx = test_context();
    let liked = ContentItem::new("tv-1", "electronics", 300.0);
    let other = ContentItem::new("tv-2", "electronics", 280.0);
    ctx.register_items(&[liked.clone(), other.clone()]);

    let before = ctx.score(&other);
    ctx.record("tv-1", InteractionKind::Like);
    let after = ctx.score(&other);

    assert_eq!(ctx.profile().weight_for("electronics"), 5);
    assert_eq!(before.breakdown.affinity, 0.0);
    assert_eq!(after.breakdown.affinity, 15.0);
}

#[test]
fn test_small_catalog_returns_everything_sorted() {
    let ctx = test_context();
    let candidates = catalog(12);

    let feed = ctx.build_feed_with(&candidates, 20);

    assert_eq!(feed.len(), candidates.len());
    assert!(feed.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_large_catalog_batch_contract() {
    let ctx = test_context();
    let candidates = catalog(60);
    let batch_size = 20;

    // Score against the same profile and session state the feed will use
    let mut ranked: Vec<_> = candidates.iter().map(|item| ctx.score(item)).collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let feed = ctx.build_feed_with(&candidates, batch_size);
    assert_eq!(feed.len(), batch_size);

    let trending = trending_count(batch_size);
    let cutoff = ranked[trending - 1].score;
    for scored in &feed[..trending] {
        // Clock moves between the two scoring passes
        assert!(scored.score >= cutoff - 1e-3, "{} below the trending cut", scored.item.id);
    }

    let unique: HashSet<_> = feed.iter().map(|s| s.item.id.as_str()).collect();
    assert_eq!(unique.len(), batch_size);
}

#[test]
fn test_second_batch_drops_novelty_for_returned_items() {
    let ctx = test_context();
    let candidates = catalog(5);

    let first = ctx.build_feed_with(&candidates, 10);
    assert!(first.iter().all(|s| s.breakdown.novelty == 5.0));

    let second = ctx.build_feed_with(&candidates, 10);
    assert!(second.iter().all(|s| s.breakdown.novelty == 0.0));
}
