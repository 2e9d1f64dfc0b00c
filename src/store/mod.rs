//! Matchup data store.
//!
//! Owns every league cache entry, every in-flight upstream fetch and every
//! observer channel. Responsibilities:
//!   • Warm skeleton entries so observers see a league before any data
//!   • Hydrate single matchups on demand, with at most one fetch in flight
//!     per matchup no matter how many callers ask
//!   • Refresh cached matchups when their live-aware TTL lapses
//!   • Track which players changed during the latest refresh cycle
//!   • Push a consistent `LeagueSnapshot` to observers on every transition
//!
//! All state lives behind one lock that is never held across an `.await`;
//! only the provider calls themselves run concurrently, each in its own task
//! so that callers going away never cancels a fetch others may be sharing.

pub mod entry;
pub mod subscription;
pub mod ttl;

pub use entry::{CacheKey, MY_MATCHUP};
pub use subscription::LeagueSubscription;
pub use ttl::TtlPolicy;

use chrono::{DateTime, Utc};
use futures_util::future::{join_all, FutureExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ProviderError, StoreError, StoreResult};
use crate::provider::{LeagueProvider, ProviderFactory};
use crate::snapshot::{
    changed_players, LeagueDescriptor, LeagueSnapshot, LoadState, MatchupId, MatchupSnapshot,
    PlayerId, PlayerSnapshot,
};
use entry::{CacheEntry, CachedMatchup, PendingFetch, SharedFetch};

/// Thread-safe, in-memory league matchup cache. Cheap to clone.
#[derive(Clone)]
pub struct MatchupDataStore {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    factory: Arc<dyn ProviderFactory>,
    ttl: TtlPolicy,
    /// Source of fetch ids, subscriber ids and entry generations.
    next_id: AtomicU64,
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<CacheKey, CacheEntry>,
    subscribers: HashMap<CacheKey, HashMap<u64, mpsc::UnboundedSender<LeagueSnapshot>>>,
    /// Players changed during the most recent refresh cycle.
    changed_players: HashSet<PlayerId>,
}

/// One matchup scheduled for re-fetch within a refresh cycle.
struct RefreshFetch {
    id: MatchupId,
    previous: MatchupSnapshot,
    future: SharedFetch,
}

impl StoreState {
    /// Locate the entry a matchup belongs to. If several seasons are warmed
    /// for the same league and week, the latest season wins.
    fn key_for(&self, id: &MatchupId) -> Option<CacheKey> {
        self.entries
            .keys()
            .filter(|k| k.contains(id))
            .max_by_key(|k| k.season)
            .cloned()
    }

    /// Send the entry's current state to every live subscriber, pruning
    /// closed channels.
    fn emit(&mut self, key: &CacheKey) {
        let Some(entry) = self.entries.get(key) else {
            return;
        };
        let Some(subs) = self.subscribers.get_mut(key) else {
            return;
        };
        let snapshot = entry.to_snapshot(key);
        subs.retain(|_, tx| tx.send(snapshot.clone()).is_ok());
    }
}

impl StoreInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn unsubscribe(&self, key: &CacheKey, id: u64) {
        let mut state = self.state.lock();
        if let Some(subs) = state.subscribers.get_mut(key) {
            subs.remove(&id);
            if subs.is_empty() {
                state.subscribers.remove(key);
            }
        }
        debug!("Unsubscribed observer {} from {}", id, key.league_id);
    }
}

impl MatchupDataStore {
    pub fn new(factory: Arc<dyn ProviderFactory>, ttl: TtlPolicy) -> Self {
        MatchupDataStore {
            inner: Arc::new(StoreInner {
                factory,
                ttl,
                next_id: AtomicU64::new(1),
                state: Mutex::new(StoreState::default()),
            }),
        }
    }

    /// Create skeleton entries for leagues that are not cached yet.
    /// Already-warm leagues are left untouched and emit nothing.
    pub fn warm(&self, leagues: &[LeagueDescriptor], week: u32) {
        let mut state = self.inner.state.lock();
        for league in leagues {
            let key = CacheKey::new(league, week);
            if state.entries.contains_key(&key) {
                continue;
            }
            let entry = CacheEntry::skeleton(league.clone(), self.inner.next_id());
            state.entries.insert(key.clone(), entry);
            info!(
                "Warmed {} league {} ({}) for week {}",
                league.platform, league.league_id, league.name, week
            );
            state.emit(&key);
        }
    }

    /// Return a fresh snapshot of one matchup, fetching it if the cached copy
    /// is missing or older than the league's current TTL.
    ///
    /// Concurrent callers for the same matchup share a single upstream fetch
    /// and all receive its result, success or error.
    pub async fn hydrate(&self, id: &MatchupId) -> StoreResult<MatchupSnapshot> {
        let fetch = {
            let mut state = self.inner.state.lock();
            let key = state
                .key_for(id)
                .ok_or_else(|| StoreError::LeagueNotWarmed {
                    league_id: id.league_id.clone(),
                    week: id.week,
                })?;
            let Some(entry) = state.entries.get_mut(&key) else {
                return Err(StoreError::LeagueNotWarmed {
                    league_id: id.league_id.clone(),
                    week: id.week,
                });
            };

            let ttl = self.inner.ttl.ttl(entry.snapshots());
            if let Some(cached) = entry.matchups.get(id) {
                let age = cached.fetched_at.elapsed();
                if age < ttl {
                    debug!("Cache hit for {} (age {:?}, ttl {:?})", id, age, ttl);
                    return Ok(cached.snapshot.clone());
                }
            }
            self.start_or_join(entry, &key, id)
        };
        fetch.await
    }

    /// Join the fetch in flight for `id`, or start one. Must be called with
    /// the state lock held so registration happens before anyone can await.
    fn start_or_join(&self, entry: &mut CacheEntry, key: &CacheKey, id: &MatchupId) -> SharedFetch {
        if let Some(pending) = entry.pending.get(id) {
            debug!("Joining in-flight fetch for {}", id);
            return pending.future.clone();
        }

        let fetch_id = self.inner.next_id();
        let provider = self.inner.factory.provider_for(&entry.summary, key.week);
        debug!("Fetching {} via {}", id, provider.name());

        let task = {
            let store = self.clone();
            let key = key.clone();
            let id = id.clone();
            let league = entry.summary.clone();
            tokio::spawn(async move {
                let result = AssertUnwindSafe(fetch_matchup(provider.as_ref(), id.clone(), league))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(ProviderError::Unavailable(format!(
                            "provider {} panicked",
                            provider.name()
                        ))
                        .into())
                    });
                store.complete_fetch(&key, &id, fetch_id, result)
            })
        };

        let abort = task.abort_handle();
        let cancelled = id.clone();
        let future = async move {
            task.await
                .unwrap_or_else(|_| Err(StoreError::Cancelled(cancelled)))
        }
        .boxed()
        .shared();

        entry.pending.insert(
            id.clone(),
            PendingFetch {
                fetch_id,
                future: future.clone(),
                abort,
            },
        );
        future
    }

    /// Record the outcome of a finished fetch and notify observers. Runs
    /// exactly once per fetch, from the task that performed it.
    fn complete_fetch(
        &self,
        key: &CacheKey,
        id: &MatchupId,
        fetch_id: u64,
        result: StoreResult<MatchupSnapshot>,
    ) -> StoreResult<MatchupSnapshot> {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            return result;
        };
        // Entry was cleared and re-warmed while this fetch ran.
        if entry.pending.get(id).map(|p| p.fetch_id) != Some(fetch_id) {
            return result;
        }
        entry.pending.remove(id);

        let mut changed = true;
        let result = match result {
            Ok(mut snapshot) => {
                if let Some(prev) = entry.matchups.get(id) {
                    if snapshot.last_updated <= prev.snapshot.last_updated {
                        snapshot.last_updated =
                            prev.snapshot.last_updated + chrono::Duration::microseconds(1);
                    }
                }
                entry.matchups.insert(
                    id.clone(),
                    CachedMatchup {
                        snapshot: snapshot.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                // Mid-cycle results go out with the cycle's final snapshot.
                if entry.load_state == LoadState::Refreshing {
                    changed = false;
                } else {
                    entry.load_state = LoadState::Ready;
                }
                debug!("Cached {} ({} matchups in league)", id, entry.matchups.len());
                Ok(snapshot)
            }
            Err(e) => {
                debug!("Fetch for {} failed: {}", id, e);
                if entry.load_state != LoadState::Refreshing && entry.matchups.is_empty() {
                    entry.load_state = LoadState::Failed {
                        reason: e.to_string(),
                    };
                } else {
                    changed = false;
                }
                Err(e)
            }
        };

        if changed {
            state.emit(key);
        }
        result
    }

    /// Re-fetch cached matchups for one league, or every league when `league`
    /// is `None`. Leagues still inside their TTL are skipped unless `force`.
    ///
    /// Per-matchup failures are logged and leave the previous snapshot in
    /// place; nothing is returned to the caller. The league only ends up
    /// `Failed` when every one of its matchups failed.
    ///
    /// Each league's cycle is finalized in its own task, so dropping the
    /// returned future never leaves a league stuck in `Refreshing`.
    pub async fn refresh(&self, league: Option<&CacheKey>, force: bool) {
        let plans = {
            let mut state = self.inner.state.lock();
            state.changed_players.clear();

            let keys: Vec<CacheKey> = match league {
                Some(key) => vec![key.clone()],
                None => state.entries.keys().cloned().collect(),
            };

            let mut plans = Vec::with_capacity(keys.len());
            for key in keys {
                let Some(entry) = state.entries.get_mut(&key) else {
                    debug!("Refresh requested for unknown league {}", key.league_id);
                    continue;
                };

                if !force {
                    let ttl = self.inner.ttl.ttl(entry.snapshots());
                    let age = entry.last_refreshed.elapsed();
                    if age < ttl {
                        debug!(
                            "Skipping refresh of {} (age {:?} < ttl {:?})",
                            key.league_id, age, ttl
                        );
                        continue;
                    }
                }

                entry.load_state = LoadState::Refreshing;
                let mut ids: Vec<MatchupId> = entry.matchups.keys().cloned().collect();
                ids.sort_by(|a, b| a.matchup_id.cmp(&b.matchup_id));

                let mut fetches = Vec::with_capacity(ids.len());
                for id in ids {
                    let Some(previous) = entry.matchups.get(&id).map(|c| c.snapshot.clone())
                    else {
                        continue;
                    };
                    let future = self.start_or_join(entry, &key, &id);
                    fetches.push(RefreshFetch {
                        id,
                        previous,
                        future,
                    });
                }

                let generation = entry.generation;
                state.emit(&key);
                plans.push((key, generation, fetches));
            }
            plans
        };

        if plans.is_empty() {
            return;
        }

        let cycles: Vec<_> = plans
            .into_iter()
            .map(|(key, generation, fetches)| {
                tokio::spawn(self.clone().refresh_league(key, generation, fetches))
            })
            .collect();
        let leagues = cycles.len();

        let mut changed = HashSet::new();
        for result in join_all(cycles).await {
            match result {
                Ok(players) => changed.extend(players),
                Err(e) => warn!("League refresh task did not finish: {}", e),
            }
        }

        info!(
            "Refresh cycle complete: {} league(s), {} changed player(s)",
            leagues,
            changed.len()
        );
    }

    /// Await one league's fetches, then settle its load state, merge its
    /// changed players and emit the end-of-cycle snapshot.
    async fn refresh_league(
        self,
        key: CacheKey,
        generation: u64,
        fetches: Vec<RefreshFetch>,
    ) -> HashSet<PlayerId> {
        let total = fetches.len();
        let results = join_all(fetches.into_iter().map(|f| async move {
            let result = f.future.await;
            (f.id, f.previous, result)
        }))
        .await;

        let mut changed = HashSet::new();
        let mut failures: Vec<StoreError> = Vec::new();
        for (id, previous, result) in results {
            match result {
                Ok(snapshot) => changed.extend(changed_players(&previous, &snapshot)),
                Err(e) => {
                    warn!("Refresh of {} failed, keeping cached snapshot: {}", id, e);
                    failures.push(e);
                }
            }
        }

        let mut state = self.inner.state.lock();
        let Some(entry) = state.entries.get_mut(&key) else {
            return HashSet::new();
        };
        if entry.generation != generation {
            return HashSet::new();
        }

        entry.load_state = match failures.last() {
            Some(last) if failures.len() == total => {
                error!(
                    "Refresh of league {} failed for all {} matchup(s): {}",
                    key.league_id, total, last
                );
                LoadState::Failed {
                    reason: last.to_string(),
                }
            }
            _ => LoadState::Ready,
        };
        entry.mark_refreshed();
        state.emit(&key);
        state.changed_players.extend(changed.iter().cloned());
        changed
    }

    /// Cached snapshot for a matchup regardless of age. Never fetches.
    pub fn cached_matchup(&self, id: &MatchupId) -> Option<MatchupSnapshot> {
        let state = self.inner.state.lock();
        let key = state.key_for(id)?;
        state
            .entries
            .get(&key)?
            .matchups
            .get(id)
            .map(|c| c.snapshot.clone())
    }

    pub fn cached_matchups(&self, key: &CacheKey) -> Vec<MatchupSnapshot> {
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .map(CacheEntry::sorted_snapshots)
            .unwrap_or_default()
    }

    /// Current state of one league, as an observer would see it.
    pub fn league_snapshot(&self, key: &CacheKey) -> Option<LeagueSnapshot> {
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .map(|e| e.to_snapshot(key))
    }

    pub fn league_keys(&self) -> Vec<CacheKey> {
        self.inner.state.lock().entries.keys().cloned().collect()
    }

    /// Subscribe to a league. If the league is already cached its current
    /// state is delivered immediately, even when it is still a skeleton.
    pub fn observe_league(&self, key: &CacheKey) -> LeagueSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id();

        let mut state = self.inner.state.lock();
        if let Some(entry) = state.entries.get(key) {
            // Receiver is alive in this scope, so this cannot fail.
            let _ = tx.send(entry.to_snapshot(key));
        }
        state
            .subscribers
            .entry(key.clone())
            .or_default()
            .insert(id, tx);
        debug!("Observer {} subscribed to {}", id, key.league_id);

        LeagueSubscription::new(id, key.clone(), rx, Arc::downgrade(&self.inner))
    }

    /// Drop everything: abort in-flight fetches, close every observer stream
    /// and discard all entries.
    pub fn clear_caches(&self) {
        let mut state = self.inner.state.lock();
        let leagues = state.entries.len();
        for entry in state.entries.values_mut() {
            entry.abort_pending();
        }
        state.entries.clear();
        state.subscribers.clear();
        state.changed_players.clear();
        info!("Cleared {} cached league(s)", leagues);
    }

    /// Players whose score, game status or injury status changed during the
    /// most recent refresh cycle.
    pub fn changed_players(&self) -> HashSet<PlayerId> {
        self.inner.state.lock().changed_players.clone()
    }

    /// Every rostered player across all cached matchups, one entry per player
    /// id (taken from the most recently updated matchup), ordered by id.
    pub fn all_players(&self) -> Vec<PlayerSnapshot> {
        let state = self.inner.state.lock();
        let mut newest: HashMap<&str, (DateTime<Utc>, &PlayerSnapshot)> = HashMap::new();
        for matchup in state.entries.values().flat_map(CacheEntry::snapshots) {
            for player in matchup.teams().into_iter().flat_map(|t| t.roster.iter()) {
                let seen = newest
                    .entry(player.id.as_str())
                    .or_insert((matchup.last_updated, player));
                if matchup.last_updated > seen.0 {
                    *seen = (matchup.last_updated, player);
                }
            }
        }

        let mut players: Vec<PlayerSnapshot> =
            newest.into_values().map(|(_, p)| p.clone()).collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }
}

/// Fetch the user's matchup from a provider and orient it into a snapshot.
async fn fetch_matchup(
    provider: &dyn LeagueProvider,
    id: MatchupId,
    league: LeagueDescriptor,
) -> StoreResult<MatchupSnapshot> {
    let matchups = provider.fetch_matchups().await?;
    debug!(
        "{} returned {} matchup(s) for {}",
        provider.name(),
        matchups.len(),
        id
    );

    let my_team_id =
        provider
            .identify_my_team_id()
            .await
            .ok_or_else(|| StoreError::TeamNotIdentified {
                league_id: id.league_id.clone(),
            })?;

    let not_found = || StoreError::MatchupNotFound {
        league_id: id.league_id.clone(),
        team_id: my_team_id.clone(),
    };
    let matchup = provider
        .find_my_matchup(&my_team_id)
        .await
        .ok_or_else(not_found)?;

    let not_found = not_found();
    matchup
        .into_snapshot(id, &my_team_id, league, Utc::now())
        .ok_or(not_found)
}
