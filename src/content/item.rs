//! Content item as served by the content store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rankable piece of content (product listing, post, ...).
///
/// Owned by the content store; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub category: String,
    /// Missing creation time ranks as freshest
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub owner_id: String,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, category: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            price,
            category: category.into(),
            created_at: None,
            view_count: 0,
            rating: 0.0,
            owner_id: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_views(mut self, views: u64) -> Self {
        self.view_count = views;
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_store_json() {
        let raw = r#"{
            "id": "p-42",
            "title": "Desk lamp",
            "price": 35.5,
            "category": "home",
            "createdAt": "2026-10-01T12:00:00Z",
            "viewCount": 120,
            "rating": 4.5,
            "ownerId": "u-7"
        }"#;

        let item: ContentItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.id, "p-42");
        assert_eq!(item.view_count, 120);
        assert!(item.created_at.is_some());
    }

    #[test]
    fn test_sparse_json_uses_defaults() {
        let item: ContentItem = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(item.created_at.is_none());
        assert_eq!(item.rating, 0.0);
        assert_eq!(item.category, "");
    }
}
