use anyhow::Result;
use clap::Parser;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use league_cache::config::Config;
use league_cache::provider::FixtureFactory;
use league_cache::snapshot::LeagueSnapshot;
use league_cache::store::{CacheKey, MatchupDataStore};
use league_cache::sync::spawn_refresh_loop;
use league_cache::week::WeekSelector;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let leagues = config.load_leagues()?;
    info!(
        "Loaded {} league(s) from {}",
        leagues.len(),
        config.leagues_file.display()
    );

    let factory = Arc::new(FixtureFactory::new(&config.fixture_dir));
    let store = MatchupDataStore::new(factory, config.ttl_policy());
    let selector = WeekSelector::new(config.week);

    // Observe every league for the starting week. Streams end when the
    // store clears its caches on shutdown.
    for league in &leagues {
        let mut subscription = store.observe_league(&CacheKey::new(league, config.week));
        tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                log_snapshot(&snapshot);
            }
        });
    }

    let refresh = spawn_refresh_loop(
        store.clone(),
        leagues,
        selector.subscribe(),
        config.sync_settings(),
    );

    match config.run_for_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutting down");
    drop(selector);
    refresh.await?;
    store.clear_caches();

    Ok(())
}

fn log_snapshot(snapshot: &LeagueSnapshot) {
    info!(
        "[{}] {} week {}: {:?}, {} matchup(s)",
        snapshot.key.platform,
        snapshot.league.name,
        snapshot.key.week,
        snapshot.load_state,
        snapshot.matchups.len()
    );
    for m in &snapshot.matchups {
        info!(
            "  {} {:.2} vs {} {:.2} ({:?}, updated {})",
            m.my_team.info.owner_name,
            m.my_team.score.actual,
            m.opponent_team.info.owner_name,
            m.opponent_team.score.actual,
            m.metadata.status,
            m.last_updated.format("%H:%M:%S")
        );
    }
}
