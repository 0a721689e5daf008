//! Read-only aggregation over the window store for dashboards.

use serde::Serialize;
use std::collections::BTreeMap;

use super::category::Category;
use super::store::WindowStore;
use super::sweeper::SweepReport;

/// Point-in-time view of limiter state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Windows currently tracked
    pub active_windows: usize,
    /// Actors inside an active block
    pub blocked_actors: usize,
    /// Tracked windows per category, every category present
    pub by_category: BTreeMap<Category, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sweep: Option<SweepReport>,
}

impl StatsSnapshot {
    /// Scan the whole store. O(n); not for the request path.
    pub fn collect(store: &WindowStore, now_ms: u64, last_sweep: Option<SweepReport>) -> Self {
        let mut by_category: BTreeMap<Category, usize> =
            Category::ALL.iter().map(|&c| (c, 0)).collect();
        let mut active_windows = 0;
        let mut blocked_actors = 0;

        store.for_each(|key, entry| {
            active_windows += 1;
            *by_category.entry(key.category).or_default() += 1;
            if entry.block_remaining(now_ms).is_some() {
                blocked_actors += 1;
            }
        });

        Self {
            active_windows,
            blocked_actors,
            by_category,
            last_sweep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ActorKey, Decision, RateLimiter, WindowEntry, WindowKey};

    #[test]
    fn test_empty_store() {
        let stats = StatsSnapshot::collect(&WindowStore::new(), 0, None);

        assert_eq!(stats.active_windows, 0);
        assert_eq!(stats.blocked_actors, 0);
        assert_eq!(stats.by_category.len(), 8);
        assert!(stats.by_category.values().all(|&n| n == 0));
    }

    #[test]
    fn test_counts_by_category_and_blocks() {
        let store = WindowStore::new();
        let ip = |s: &str| ActorKey::Ip(s.to_string());

        store.set(WindowKey::new(Category::Auth, ip("10.0.0.1")), WindowEntry::new(0));
        store.set(WindowKey::new(Category::Auth, ip("10.0.0.2")), WindowEntry::new(0));
        store.set(
            WindowKey::new(Category::Payment, ip("10.0.0.1")),
            WindowEntry {
                count: 4,
                window_start_ms: 0,
                blocked_until_ms: Some(5_000),
            },
        );
        // Block already over: not counted as blocked.
        store.set(
            WindowKey::new(Category::Maps, ip("10.0.0.3")),
            WindowEntry {
                count: 61,
                window_start_ms: 0,
                blocked_until_ms: Some(500),
            },
        );

        let stats = StatsSnapshot::collect(&store, 1_000, None);
        assert_eq!(stats.active_windows, 4);
        assert_eq!(stats.blocked_actors, 1);
        assert_eq!(stats.by_category[&Category::Auth], 2);
        assert_eq!(stats.by_category[&Category::Payment], 1);
        assert_eq!(stats.by_category[&Category::Maps], 1);
        assert_eq!(stats.by_category[&Category::Default], 0);
    }

    #[test]
    fn test_stats_json_shape() {
        let limiter = RateLimiter::new();
        let actor = ActorKey::User("42".to_string());
        for t in 0..4 {
            limiter.admit(Category::Payment, &actor, t);
        }
        assert!(matches!(
            limiter.admit(Category::Payment, &actor, 5),
            Decision::Blocked { .. }
        ));

        let json = serde_json::to_value(limiter.stats_at(10)).unwrap();
        assert_eq!(json["activeWindows"], 1);
        assert_eq!(json["blockedActors"], 1);
        assert_eq!(json["byCategory"]["payment"], 1);
        assert_eq!(json["byCategory"]["auth"], 0);
        assert!(json.get("lastSweep").is_none());
    }
}
