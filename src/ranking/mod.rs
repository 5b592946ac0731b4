//! Feed ranking
//!
//! Scores candidate items against the user's affinity profile and assembles
//! ordered, diversified feed batches. Deliberately simple: it favours new and
//! currently popular items so a small catalog feels active.

mod feed;
mod score;

pub use feed::{diversity_count, trending_count, RankingEngine};
pub use score::{
    score_breakdown, ReasonTag, ScoreBreakdown, ScoredItem, AFFINITY_CAP, FRESHNESS_CAP,
    NOVELTY_BONUS, PRICE_FIT_BONUS, RATING_CAP, VIEW_CAP,
};
