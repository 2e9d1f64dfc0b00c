pub mod fixture;

pub use fixture::{FixtureFactory, FixtureProvider};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ProviderError;
use crate::snapshot::{
    GameStatus, LeagueDescriptor, MatchupId, MatchupMetadata, MatchupSnapshot, MatchupStatus,
    PlayerContext, PlayerIdentity, PlayerMetrics, PlayerSnapshot, TeamId, TeamInfo, TeamScore,
    TeamSnapshot,
};

/// Trait that every upstream league provider must implement.
///
/// One instance serves one league for one week. Implementations own their
/// credentials, HTTP calls and schema quirks; what comes out is the
/// platform-neutral [`Matchup`] record.
#[async_trait]
pub trait LeagueProvider: Send + Sync {
    /// Fetch every matchup in the league for the provider's week.
    async fn fetch_matchups(&self) -> Result<Vec<Matchup>, ProviderError>;

    /// Resolve the authenticated user's team, if they have one in this league.
    async fn identify_my_team_id(&self) -> Option<TeamId>;

    /// The matchup pairing `my_team_id` this week, from the last fetch.
    async fn find_my_matchup(&self, my_team_id: &str) -> Option<Matchup>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Builds providers for a league/week pair. The only place a `Platform` is
/// inspected for routing.
pub trait ProviderFactory: Send + Sync {
    fn provider_for(&self, league: &LeagueDescriptor, week: u32) -> Arc<dyn LeagueProvider>;
}

/// Platform-neutral matchup record as returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub matchup_id: String,
    pub status: MatchupStatus,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_playoff: bool,
    #[serde(default)]
    pub is_chopped: bool,
    #[serde(default)]
    pub is_eliminated: bool,
    pub home: FantasyTeam,
    pub away: FantasyTeam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FantasyTeam {
    pub team_id: TeamId,
    pub owner_name: String,
    #[serde(default)]
    pub record: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub points: f64,
    pub projected_points: f64,
    #[serde(default)]
    pub win_probability: Option<f64>,
    #[serde(default)]
    pub players: Vec<FantasyPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FantasyPlayer {
    pub player_id: String,
    #[serde(default)]
    pub sleeper_id: Option<String>,
    #[serde(default)]
    pub espn_id: Option<String>,
    pub full_name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    pub position: String,
    #[serde(default)]
    pub lineup_slot: Option<String>,
    pub is_starter: bool,
    #[serde(default)]
    pub nfl_team: Option<String>,
    pub points: f64,
    #[serde(default)]
    pub projected_points: f64,
    #[serde(default)]
    pub game_status: Option<GameStatus>,
    #[serde(default)]
    pub injury_status: Option<String>,
    #[serde(default)]
    pub jersey_number: Option<String>,
    #[serde(default)]
    pub kickoff_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

impl Matchup {
    pub fn involves(&self, team_id: &str) -> bool {
        self.home.team_id == team_id || self.away.team_id == team_id
    }

    /// Orient this matchup around `my_team_id` and convert it into a snapshot.
    /// Returns `None` when the team is not part of the matchup.
    pub fn into_snapshot(
        self,
        id: MatchupId,
        my_team_id: &str,
        league: LeagueDescriptor,
        last_updated: DateTime<Utc>,
    ) -> Option<MatchupSnapshot> {
        let (mine, theirs) = if self.home.team_id == my_team_id {
            (self.home, self.away)
        } else if self.away.team_id == my_team_id {
            (self.away, self.home)
        } else {
            return None;
        };

        let margin = mine.points - theirs.points;
        Some(MatchupSnapshot {
            id,
            metadata: MatchupMetadata {
                status: self.status,
                start_time: self.start_time,
                is_playoff: self.is_playoff,
                is_chopped: self.is_chopped,
                is_eliminated: self.is_eliminated,
            },
            my_team: mine.into_snapshot(margin),
            opponent_team: theirs.into_snapshot(-margin),
            league,
            last_updated,
        })
    }
}

impl FantasyTeam {
    fn into_snapshot(self, margin: f64) -> TeamSnapshot {
        TeamSnapshot {
            info: TeamInfo {
                team_id: self.team_id,
                owner_name: self.owner_name,
                record: self.record,
                avatar_url: self.avatar_url,
            },
            score: TeamScore {
                actual: self.points,
                projected: self.projected_points,
                win_probability: self.win_probability,
                margin,
            },
            roster: self
                .players
                .into_iter()
                .map(FantasyPlayer::into_snapshot)
                .collect(),
        }
    }
}

impl FantasyPlayer {
    fn into_snapshot(self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.player_id.clone(),
            identity: PlayerIdentity {
                player_id: self.player_id,
                sleeper_id: self.sleeper_id,
                espn_id: self.espn_id,
                full_name: self.full_name,
                short_name: self.short_name,
            },
            metrics: PlayerMetrics {
                current_score: self.points,
                projected_score: self.projected_points,
                delta: self.points - self.projected_points,
                last_activity: self.last_activity,
                game_status: self.game_status,
            },
            context: PlayerContext {
                position: self.position,
                lineup_slot: self.lineup_slot,
                is_starter: self.is_starter,
                team: self.nfl_team,
                injury_status: self.injury_status,
                jersey_number: self.jersey_number,
                kickoff_time: self.kickoff_time,
            },
        }
    }
}
