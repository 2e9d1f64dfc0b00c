use std::time::Duration;

use crate::snapshot::MatchupSnapshot;

pub const LIVE_TTL: Duration = Duration::from_secs(15);
pub const IDLE_TTL: Duration = Duration::from_secs(300);

/// Freshness policy: a league with any starter in a game that is underway
/// goes stale after `live`, everything else after `idle`.
///
/// Evaluated against the cached matchups on every freshness check, never
/// memoized, because game state moves independently of our refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub live: Duration,
    pub idle: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy {
            live: LIVE_TTL,
            idle: IDLE_TTL,
        }
    }
}

impl TtlPolicy {
    pub fn ttl<'a, I>(&self, matchups: I) -> Duration
    where
        I: IntoIterator<Item = &'a MatchupSnapshot>,
    {
        if matchups.into_iter().any(MatchupSnapshot::has_live_starter) {
            self.live
        } else {
            self.idle
        }
    }
}
