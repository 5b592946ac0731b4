//! Load strategies and the triggers that pick them

use serde::{Deserialize, Serialize};

/// How eagerly a resource is fetched and whether the result is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Needed to render the current route
    Critical,
    /// Likely needed next (hover intent)
    Important,
    /// Loaded on demand, or when idle if preloaded
    Normal,
    /// Never preloaded, never cached
    Low,
}

impl LoadStrategy {
    /// Fetch immediately when preloaded
    pub fn preload(&self) -> bool {
        matches!(self, LoadStrategy::Critical | LoadStrategy::Important)
    }

    /// Keep the result in the resource cache
    pub fn cache(&self) -> bool {
        !matches!(self, LoadStrategy::Low)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStrategy::Critical => "critical",
            LoadStrategy::Important => "important",
            LoadStrategy::Normal => "normal",
            LoadStrategy::Low => "low",
        }
    }
}

/// UI event that causes a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTrigger {
    /// Pointer hovered a navigable element
    Hover { url: String },
    /// Element scrolled into the viewport
    Viewport { url: String },
    /// Navigation to a route
    RouteEntry { route: String },
}

impl LoadTrigger {
    pub fn strategy(&self) -> LoadStrategy {
        match self {
            LoadTrigger::Hover { .. } => LoadStrategy::Important,
            LoadTrigger::Viewport { .. } => LoadStrategy::Normal,
            LoadTrigger::RouteEntry { .. } => LoadStrategy::Critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_table() {
        let table = [
            (LoadStrategy::Critical, true, true),
            (LoadStrategy::Important, true, true),
            (LoadStrategy::Normal, false, true),
            (LoadStrategy::Low, false, false),
        ];
        for (strategy, preload, cache) in table {
            assert_eq!(strategy.preload(), preload, "{}", strategy.as_str());
            assert_eq!(strategy.cache(), cache, "{}", strategy.as_str());
        }
    }

    #[test]
    fn test_trigger_strategy() {
        let hover = LoadTrigger::Hover { url: "/p/1".into() };
        let route = LoadTrigger::RouteEntry { route: "/".into() };
        assert_eq!(hover.strategy(), LoadStrategy::Important);
        assert_eq!(route.strategy(), LoadStrategy::Critical);
    }
}
