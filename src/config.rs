use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::snapshot::LeagueDescriptor;
use crate::store::TtlPolicy;
use crate::sync::SyncSettings;

/// Fantasy league matchup cache replay driver
#[derive(Parser, Debug, Clone)]
#[command(name = "league-cache", version, about)]
pub struct Config {
    /// Directory holding per-league matchup fixtures
    #[arg(long, env = "FIXTURE_DIR", default_value = "fixtures")]
    pub fixture_dir: PathBuf,

    /// JSON file listing the leagues to track
    #[arg(long, env = "LEAGUES_FILE", default_value = "fixtures/leagues.json")]
    pub leagues_file: PathBuf,

    /// NFL week to load on startup
    #[arg(long, env = "WEEK", default_value = "1")]
    pub week: u32,

    /// Seconds between refresh-loop ticks
    #[arg(long, env = "REFRESH_TICK_SECS", default_value = "5")]
    pub refresh_tick_secs: u64,

    /// Maximum random delay added to each tick, in milliseconds
    #[arg(long, env = "REFRESH_JITTER_MS", default_value = "500")]
    pub refresh_jitter_ms: u64,

    /// Cache TTL while any starter is in a live game
    #[arg(long, env = "LIVE_TTL_SECS", default_value = "15")]
    pub live_ttl_secs: u64,

    /// Cache TTL when no starter is playing
    #[arg(long, env = "IDLE_TTL_SECS", default_value = "300")]
    pub idle_ttl_secs: u64,

    /// Exit after this many seconds instead of waiting for Ctrl-C
    #[arg(long, env = "RUN_FOR_SECS")]
    pub run_for_secs: Option<u64>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=18).contains(&self.week) {
            anyhow::bail!("week must be between 1 and 18");
        }
        if self.refresh_tick_secs == 0 {
            anyhow::bail!("refresh_tick_secs must be positive");
        }
        if self.live_ttl_secs == 0 {
            anyhow::bail!("live_ttl_secs must be positive");
        }
        if self.live_ttl_secs > self.idle_ttl_secs {
            anyhow::bail!("live_ttl_secs must not exceed idle_ttl_secs");
        }
        Ok(())
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            live: Duration::from_secs(self.live_ttl_secs),
            idle: Duration::from_secs(self.idle_ttl_secs),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            tick: Duration::from_secs(self.refresh_tick_secs),
            jitter: Duration::from_millis(self.refresh_jitter_ms),
        }
    }

    pub fn load_leagues(&self) -> anyhow::Result<Vec<LeagueDescriptor>> {
        let raw = std::fs::read_to_string(&self.leagues_file)
            .with_context(|| format!("Failed to read {}", self.leagues_file.display()))?;
        let leagues: Vec<LeagueDescriptor> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.leagues_file.display()))?;
        if leagues.is_empty() {
            anyhow::bail!("{} lists no leagues", self.leagues_file.display());
        }
        Ok(leagues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("league-cache").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults_validate() {
        let config = parse(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl_policy(), TtlPolicy::default());
        assert_eq!(config.sync_settings().tick, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_out_of_range_week() {
        assert!(parse(&["--week", "0"]).validate().is_err());
        assert!(parse(&["--week", "19"]).validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_ttls() {
        let config = parse(&["--live-ttl-secs", "600", "--idle-ttl-secs", "300"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_tick() {
        assert!(parse(&["--refresh-tick-secs", "0"]).validate().is_err());
    }

    #[test]
    fn test_missing_leagues_file() {
        let config = parse(&["--leagues-file", "/no/such/leagues.json"]);
        let err = config.load_leagues().unwrap_err();
        assert!(err.to_string().contains("/no/such/leagues.json"));
    }
}
