use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::StoreResult;
use crate::snapshot::{
    LeagueDescriptor, LeagueSnapshot, LoadState, MatchupId, MatchupSnapshot, Platform,
};

/// Matchup slot holding the user's own matchup in each league.
pub const MY_MATCHUP: &str = "mine";

/// Identifies one league at one week of one season.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub league_id: String,
    pub platform: Platform,
    pub season: i32,
    pub week: u32,
}

impl CacheKey {
    pub fn new(league: &LeagueDescriptor, week: u32) -> Self {
        CacheKey {
            league_id: league.league_id.clone(),
            platform: league.platform,
            season: league.season,
            week,
        }
    }

    /// Whether `id` belongs to this league and week.
    pub fn contains(&self, id: &MatchupId) -> bool {
        self.league_id == id.league_id && self.platform == id.platform && self.week == id.week
    }

    pub fn matchup_id(&self, matchup_id: impl Into<String>) -> MatchupId {
        MatchupId {
            league_id: self.league_id.clone(),
            matchup_id: matchup_id.into(),
            platform: self.platform,
            week: self.week,
        }
    }

    pub fn my_matchup(&self) -> MatchupId {
        self.matchup_id(MY_MATCHUP)
    }
}

pub(crate) type SharedFetch = Shared<BoxFuture<'static, StoreResult<MatchupSnapshot>>>;

/// A fetch currently in flight for one matchup.
pub(crate) struct PendingFetch {
    pub fetch_id: u64,
    pub future: SharedFetch,
    pub abort: AbortHandle,
}

pub(crate) struct CachedMatchup {
    pub snapshot: MatchupSnapshot,
    pub fetched_at: Instant,
}

/// Mutable per-league state. Only the store touches it, under its lock.
pub(crate) struct CacheEntry {
    /// Distinguishes this entry from an earlier one for the same key that was
    /// cleared while work against it was still running.
    pub generation: u64,
    pub summary: LeagueDescriptor,
    pub matchups: HashMap<MatchupId, CachedMatchup>,
    pub load_state: LoadState,
    pub pending: HashMap<MatchupId, PendingFetch>,
    pub last_refreshed: Instant,
    pub last_refreshed_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn skeleton(summary: LeagueDescriptor, generation: u64) -> Self {
        CacheEntry {
            generation,
            summary,
            matchups: HashMap::new(),
            load_state: LoadState::Skeleton,
            pending: HashMap::new(),
            last_refreshed: Instant::now(),
            last_refreshed_at: Utc::now(),
        }
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &MatchupSnapshot> {
        self.matchups.values().map(|c| &c.snapshot)
    }

    /// Cached matchups ordered by matchup id.
    pub fn sorted_snapshots(&self) -> Vec<MatchupSnapshot> {
        let mut out: Vec<MatchupSnapshot> = self.snapshots().cloned().collect();
        out.sort_by(|a, b| a.id.matchup_id.cmp(&b.id.matchup_id));
        out
    }

    pub fn to_snapshot(&self, key: &CacheKey) -> LeagueSnapshot {
        LeagueSnapshot {
            key: key.clone(),
            league: self.summary.clone(),
            load_state: self.load_state.clone(),
            matchups: self.sorted_snapshots(),
            last_refreshed: self.last_refreshed_at,
        }
    }

    pub fn mark_refreshed(&mut self) {
        self.last_refreshed = Instant::now();
        self.last_refreshed_at = Utc::now();
    }

    /// Abort every in-flight fetch. Callers awaiting them see `Cancelled`.
    pub fn abort_pending(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.abort.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::{league, matchup};

    #[test]
    fn test_cache_key_equality_uses_all_fields() {
        let l = league("L1");
        let a = CacheKey::new(&l, 5);
        assert_eq!(a, CacheKey::new(&l, 5));
        assert_ne!(a, CacheKey::new(&l, 6));

        let mut next_season = l.clone();
        next_season.season = 2025;
        assert_ne!(a, CacheKey::new(&next_season, 5));

        let mut espn = l;
        espn.platform = Platform::Espn;
        assert_ne!(a, CacheKey::new(&espn, 5));
    }

    #[test]
    fn test_cache_key_contains_matchup() {
        let key = CacheKey::new(&league("L1"), 5);
        let id = key.matchup_id("M1");
        assert!(key.contains(&id));

        let other_week = CacheKey::new(&league("L1"), 6);
        assert!(!other_week.contains(&id));
        assert_eq!(key.my_matchup().matchup_id, MY_MATCHUP);
    }

    #[tokio::test]
    async fn test_skeleton_snapshot_is_empty() {
        let key = CacheKey::new(&league("L1"), 5);
        let entry = CacheEntry::skeleton(league("L1"), 1);
        let snap = entry.to_snapshot(&key);
        assert_eq!(snap.load_state, LoadState::Skeleton);
        assert!(snap.matchups.is_empty());
        assert_eq!(snap.key, key);
    }

    #[tokio::test]
    async fn test_sorted_snapshots_orders_by_matchup_id() {
        let mut entry = CacheEntry::skeleton(league("L1"), 1);
        for mid in ["M3", "M1", "M2"] {
            let mut m = matchup(vec![], vec![]);
            m.id.matchup_id = mid.to_string();
            entry.matchups.insert(
                m.id.clone(),
                CachedMatchup {
                    snapshot: m,
                    fetched_at: Instant::now(),
                },
            );
        }
        let ids: Vec<String> = entry
            .sorted_snapshots()
            .into_iter()
            .map(|m| m.id.matchup_id)
            .collect();
        assert_eq!(ids, vec!["M1", "M2", "M3"]);
    }
}
