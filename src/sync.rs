//! Background refresh loop.
//!
//! Ticks at a fixed cadence and asks the store for a non-forced refresh of
//! every league; the store's TTL policy decides which leagues actually go
//! upstream, so leagues with live starters are re-fetched every tick or two
//! while idle leagues are left alone for minutes. Week changes published by
//! the [`WeekSelector`](crate::week::WeekSelector) warm and hydrate the new
//! week immediately.

use futures_util::future::join_all;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::snapshot::LeagueDescriptor;
use crate::store::{CacheKey, MatchupDataStore};

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// How often the store is asked to refresh stale leagues.
    pub tick: Duration,
    /// Upper bound of the random delay added before each refresh.
    pub jitter: Duration,
}

/// Spawn the refresh loop. It runs until the week selector is dropped.
pub fn spawn_refresh_loop(
    store: MatchupDataStore,
    leagues: Vec<LeagueDescriptor>,
    mut weeks: watch::Receiver<u32>,
    settings: SyncSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut week = *weeks.borrow_and_update();
        load_week(&store, &leagues, week).await;
        info!(
            "Refresh loop started ({} league(s), week {}, tick={:?})",
            leagues.len(),
            week,
            settings.tick
        );

        let mut interval = tokio::time::interval(settings.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let delay = jitter(settings.jitter);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    store.refresh(None, false).await;
                    let changed = store.changed_players();
                    if !changed.is_empty() {
                        info!("{} player(s) changed in week {}", changed.len(), week);
                    }
                }
                res = weeks.changed() => {
                    if res.is_err() {
                        info!("Week selector closed, stopping refresh loop");
                        break;
                    }
                    week = *weeks.borrow_and_update();
                    load_week(&store, &leagues, week).await;
                }
            }
        }
    })
}

/// Warm every league for `week` and hydrate each user matchup.
pub async fn load_week(store: &MatchupDataStore, leagues: &[LeagueDescriptor], week: u32) {
    store.warm(leagues, week);
    let ids: Vec<_> = leagues
        .iter()
        .map(|l| CacheKey::new(l, week).my_matchup())
        .collect();

    let results = join_all(ids.iter().map(|id| store.hydrate(id))).await;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(snapshot) => debug!(
                "Hydrated {}: {:.2} - {:.2}",
                id, snapshot.my_team.score.actual, snapshot.opponent_team.score.actual
            ),
            Err(e) => warn!("Could not hydrate {}: {}", id, e),
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
