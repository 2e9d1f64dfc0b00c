//! File-backed league provider for offline development and replays.
//!
//! Each league/week is a JSON document on disk:
//!
//! ```text
//!  <dir>/<platform>_<league_id>_w<week>.json
//!  { "my_team_id": "4", "matchups": [ { "matchup_id": "2", "status": "in_progress", ... } ] }
//! ```
//!
//! The file is re-read on every fetch, so editing it while the process runs
//! behaves like an upstream feed moving forward.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{LeagueProvider, Matchup, ProviderFactory};
use crate::error::ProviderError;
use crate::snapshot::{LeagueDescriptor, TeamId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureDocument {
    #[serde(default)]
    pub my_team_id: Option<TeamId>,
    #[serde(default)]
    pub matchups: Vec<Matchup>,
}

pub fn parse_fixture(raw: &str) -> Result<FixtureDocument, ProviderError> {
    serde_json::from_str(raw).map_err(|e| ProviderError::Decode(e.to_string()))
}

pub fn fixture_path(dir: &Path, league: &LeagueDescriptor, week: u32) -> PathBuf {
    dir.join(format!(
        "{}_{}_w{}.json",
        league.platform, league.league_id, week
    ))
}

pub struct FixtureProvider {
    name: String,
    path: PathBuf,
    last: Mutex<Option<FixtureDocument>>,
}

impl FixtureProvider {
    pub fn new(path: PathBuf) -> Self {
        FixtureProvider {
            name: format!("fixture:{}", path.display()),
            path,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl LeagueProvider for FixtureProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_matchups(&self) -> Result<Vec<Matchup>, ProviderError> {
        debug!("Reading fixture {}", self.path.display());
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ProviderError::Unavailable(format!("{} not found", self.path.display()))
                }
                _ => ProviderError::Network(e.to_string()),
            })?;

        let doc = parse_fixture(&raw)?;
        let matchups = doc.matchups.clone();
        *self.last.lock() = Some(doc);
        Ok(matchups)
    }

    async fn identify_my_team_id(&self) -> Option<TeamId> {
        self.last.lock().as_ref()?.my_team_id.clone()
    }

    async fn find_my_matchup(&self, my_team_id: &str) -> Option<Matchup> {
        self.last
            .lock()
            .as_ref()?
            .matchups
            .iter()
            .find(|m| m.involves(my_team_id))
            .cloned()
    }
}

/// Hands out a [`FixtureProvider`] per league/week rooted at one directory.
pub struct FixtureFactory {
    dir: PathBuf,
}

impl FixtureFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FixtureFactory { dir: dir.into() }
    }
}

impl ProviderFactory for FixtureFactory {
    fn provider_for(&self, league: &LeagueDescriptor, week: u32) -> Arc<dyn LeagueProvider> {
        Arc::new(FixtureProvider::new(fixture_path(&self.dir, league, week)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{GameStatus, MatchupStatus, Platform};

    const DOC: &str = r#"{
        "my_team_id": "7",
        "matchups": [
            {
                "matchup_id": "1",
                "status": "in_progress",
                "home": { "team_id": "3", "owner_name": "Sam", "points": 40.5, "projected_points": 98.0 },
                "away": {
                    "team_id": "7", "owner_name": "Alex", "points": 51.2, "projected_points": 101.4,
                    "players": [
                        { "player_id": "4046", "full_name": "Patrick Mahomes", "position": "QB",
                          "is_starter": true, "points": 18.4, "game_status": "in progress" }
                    ]
                }
            }
        ]
    }"#;

    fn league() -> LeagueDescriptor {
        LeagueDescriptor {
            league_id: "991".into(),
            name: "Work League".into(),
            platform: Platform::Sleeper,
            season: 2024,
            avatar_url: None,
        }
    }

    #[test]
    fn test_parse_fixture() {
        let doc = parse_fixture(DOC).unwrap();
        assert_eq!(doc.my_team_id.as_deref(), Some("7"));
        assert_eq!(doc.matchups.len(), 1);
        let m = &doc.matchups[0];
        assert_eq!(m.status, MatchupStatus::InProgress);
        assert_eq!(m.away.players[0].game_status, Some(GameStatus::Live));
    }

    #[test]
    fn test_shipped_fixtures_parse() {
        let sleeper =
            parse_fixture(include_str!("../../fixtures/sleeper_1048231_w1.json")).unwrap();
        assert_eq!(sleeper.matchups[0].home.players.len(), 3);
        let espn = parse_fixture(include_str!("../../fixtures/espn_77120_w1.json")).unwrap();
        assert_eq!(espn.matchups[0].status, MatchupStatus::Scheduled);

        let leagues: Vec<LeagueDescriptor> =
            serde_json::from_str(include_str!("../../fixtures/leagues.json")).unwrap();
        assert_eq!(leagues[1].platform, Platform::Espn);
    }

    #[test]
    fn test_parse_fixture_rejects_garbage() {
        let err = parse_fixture("{ not json").unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[test]
    fn test_fixture_path_layout() {
        let p = fixture_path(Path::new("/data"), &league(), 5);
        assert_eq!(p, PathBuf::from("/data/sleeper_991_w5.json"));
    }

    #[tokio::test]
    async fn test_provider_reads_file_and_finds_matchup() {
        let dir =
            std::env::temp_dir().join(format!("league-cache-fixture-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(fixture_path(&dir, &league(), 5), DOC).unwrap();

        let provider = FixtureFactory::new(&dir).provider_for(&league(), 5);
        let matchups = provider.fetch_matchups().await.unwrap();
        assert_eq!(matchups.len(), 1);

        let me = provider.identify_my_team_id().await.unwrap();
        let mine = provider.find_my_matchup(&me).await.unwrap();
        assert_eq!(mine.matchup_id, "1");
        assert!(provider.find_my_matchup("99").await.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let provider = FixtureProvider::new(PathBuf::from("/definitely/not/here.json"));
        let err = provider.fetch_matchups().await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert!(provider.identify_my_team_id().await.is_none());
    }
}
