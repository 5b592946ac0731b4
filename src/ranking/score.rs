//! Per-item scoring
//!
//! Six additive terms, each capped on its own, summed without further
//! normalization:
//!
//! | term        | max | rule                                     |
//! |-------------|-----|------------------------------------------|
//! | freshness   | 40  | `40 - 2 * age_days`, unknown age = 40    |
//! | views       | 20  | `views / 50 * 10`                        |
//! | rating      | 15  | `rating / 5 * 15`                        |
//! | affinity    | 15  | `category_weight * 3`                    |
//! | price fit   | 5   | price inside the profile's band          |
//! | novelty     | 5   | never returned in a batch this session   |

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::content::ContentItem;
use crate::interaction::AffinityProfile;

pub const FRESHNESS_CAP: f64 = 40.0;
const FRESHNESS_DECAY_PER_DAY: f64 = 2.0;

pub const VIEW_CAP: f64 = 20.0;
const VIEWS_PER_STEP: f64 = 50.0;
const POINTS_PER_VIEW_STEP: f64 = 10.0;

pub const RATING_CAP: f64 = 15.0;
const MAX_RATING: f64 = 5.0;

pub const AFFINITY_CAP: f64 = 15.0;
const POINTS_PER_WEIGHT: f64 = 3.0;

pub const PRICE_FIT_BONUS: f64 = 5.0;
pub const NOVELTY_BONUS: f64 = 5.0;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Why an item ranked where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonTag {
    Fresh,
    Popular,
    HighlyRated,
    ForYou,
    InBudget,
    NewToYou,
}

/// Individual term values for one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub freshness: f64,
    pub views: f64,
    pub rating: f64,
    pub affinity: f64,
    pub price_fit: f64,
    pub novelty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.freshness + self.views + self.rating + self.affinity + self.price_fit + self.novelty
    }

    fn reason_tags(&self, item: &ContentItem) -> BTreeSet<ReasonTag> {
        let mut tags = BTreeSet::new();
        if self.freshness >= 30.0 {
            tags.insert(ReasonTag::Fresh);
        }
        if self.views >= 10.0 {
            tags.insert(ReasonTag::Popular);
        }
        if item.rating >= 4.0 {
            tags.insert(ReasonTag::HighlyRated);
        }
        if self.affinity > 0.0 {
            tags.insert(ReasonTag::ForYou);
        }
        if self.price_fit > 0.0 {
            tags.insert(ReasonTag::InBudget);
        }
        if self.novelty > 0.0 {
            tags.insert(ReasonTag::NewToYou);
        }
        tags
    }
}

/// A candidate with its score. Produced per ranking call, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredItem {
    pub item: ContentItem,
    pub score: f64,
    pub reason_tags: BTreeSet<ReasonTag>,
    pub breakdown: ScoreBreakdown,
}

impl ScoredItem {
    pub fn new(item: ContentItem, breakdown: ScoreBreakdown) -> Self {
        let reason_tags = breakdown.reason_tags(&item);
        Self {
            score: breakdown.total(),
            item,
            reason_tags,
            breakdown,
        }
    }
}

pub(crate) fn freshness_term(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(created_at) = created_at else {
        return FRESHNESS_CAP;
    };
    let age_days = (now - created_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
    (FRESHNESS_CAP - FRESHNESS_DECAY_PER_DAY * age_days).clamp(0.0, FRESHNESS_CAP)
}

pub(crate) fn view_term(views: u64) -> f64 {
    (views as f64 / VIEWS_PER_STEP * POINTS_PER_VIEW_STEP).min(VIEW_CAP)
}

pub(crate) fn rating_term(rating: f64) -> f64 {
    if !rating.is_finite() {
        return 0.0;
    }
    rating.clamp(0.0, MAX_RATING) / MAX_RATING * RATING_CAP
}

pub(crate) fn affinity_term(profile: &AffinityProfile, category: &str) -> f64 {
    (f64::from(profile.weight_for(category)) * POINTS_PER_WEIGHT).min(AFFINITY_CAP)
}

pub(crate) fn price_fit_term(profile: &AffinityProfile, price: f64) -> f64 {
    if profile.price_range.contains(price) {
        PRICE_FIT_BONUS
    } else {
        0.0
    }
}

/// Compute every term for `item` as of `now`
pub fn score_breakdown(
    item: &ContentItem,
    profile: &AffinityProfile,
    seen: bool,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    ScoreBreakdown {
        freshness: freshness_term(item.created_at, now),
        views: view_term(item.view_count),
        rating: rating_term(item.rating),
        affinity: affinity_term(profile, &item.category),
        price_fit: price_fit_term(profile, item.price),
        novelty: if seen { 0.0 } else { NOVELTY_BONUS },
    }
}
