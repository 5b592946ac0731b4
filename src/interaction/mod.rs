//! User interaction history and the affinity profile derived from it

mod log;
mod profile;

pub use log::{InteractionLog, LOG_CAPACITY};
pub use profile::{apply_to_profile, AffinityProfile, PriceRange, ProfileCache, PRICE_MARGIN};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of user action, in increasing order of intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Click,
    Like,
    Save,
    Share,
    CartAdd,
}

impl InteractionKind {
    /// Fixed weight added to the item's category on each interaction
    pub fn weight(&self) -> u32 {
        match self {
            Self::View => 1,
            Self::Click => 2,
            Self::Like => 5,
            Self::Save => 4,
            Self::Share => 6,
            Self::CartAdd => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Click => "click",
            Self::Like => "like",
            Self::Save => "save",
            Self::Share => "share",
            Self::CartAdd => "cart_add",
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "view" => Some(Self::View),
            "click" => Some(Self::Click),
            "like" => Some(Self::Like),
            "save" => Some(Self::Save),
            "share" => Some(Self::Share),
            "cart_add" | "cart-add" | "cartadd" => Some(Self::CartAdd),
            _ => None,
        }
    }
}

/// One recorded user action. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub item_id: String,
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_table() {
        assert_eq!(InteractionKind::View.weight(), 1);
        assert_eq!(InteractionKind::Click.weight(), 2);
        assert_eq!(InteractionKind::Like.weight(), 5);
        assert_eq!(InteractionKind::Save.weight(), 4);
        assert_eq!(InteractionKind::Share.weight(), 6);
        assert_eq!(InteractionKind::CartAdd.weight(), 8);
    }

    #[test]
    fn test_kind_wire_format() {
        let json = serde_json::to_string(&InteractionKind::CartAdd).unwrap();
        assert_eq!(json, "\"cart_add\"");
        assert_eq!(InteractionKind::parse("Cart-Add"), Some(InteractionKind::CartAdd));
        assert_eq!(InteractionKind::parse("wishlist"), None);
    }
}
