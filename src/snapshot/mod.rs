//! Immutable snapshot model for leagues, matchups, teams and players.
//!
//! These are plain values: the store clones them out to callers and
//! observers, and never mutates one after it has been emitted. Both upstream
//! schemas (Sleeper and ESPN) are mapped into these shapes at the provider
//! boundary, so nothing downstream needs to know which platform a league
//! lives on beyond the `Platform` tag carried in ids and cache keys.

pub mod delta;

pub use delta::{changed_players, SCORE_EPSILON};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::CacheKey;

pub type PlayerId = String;
pub type TeamId = String;

/// Upstream platform a league is hosted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Sleeper,
    Espn,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Sleeper => f.write_str("sleeper"),
            Platform::Espn => f.write_str("espn"),
        }
    }
}

/// Static description of a league as known before any matchup data is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueDescriptor {
    pub league_id: String,
    pub name: String,
    pub platform: Platform,
    pub season: i32,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Identity of one matchup inside one league for one week.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchupId {
    pub league_id: String,
    pub matchup_id: String,
    pub platform: Platform,
    pub week: u32,
}

impl fmt::Display for MatchupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/w{}/{}",
            self.platform, self.league_id, self.week, self.matchup_id
        )
    }
}

/// Normalized state of a real-world NFL game a player is involved in.
///
/// Upstream feeds report this as free-form strings; they are folded into
/// this closed set once, on deserialization, via [`GameStatus::from_upstream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum GameStatus {
    Pregame,
    Live,
    Halftime,
    Final,
    Bye,
    Unknown,
}

impl GameStatus {
    pub fn from_upstream(s: &str) -> GameStatus {
        match s.trim().to_lowercase().as_str() {
            "live" | "in" | "in_progress" | "inprogress" | "in progress" => GameStatus::Live,
            "halftime" | "half" | "ht" => GameStatus::Halftime,
            "pre" | "pregame" | "scheduled" | "not_started" | "not started" => {
                GameStatus::Pregame
            }
            "post" | "final" | "complete" | "completed" | "postgame" => GameStatus::Final,
            "bye" => GameStatus::Bye,
            _ => GameStatus::Unknown,
        }
    }

    /// Whether the game is underway. Halftime counts: scores can still move
    /// once play resumes, so cached data should stay on the short TTL.
    pub fn is_live(self) -> bool {
        matches!(self, GameStatus::Live | GameStatus::Halftime)
    }
}

impl From<String> for GameStatus {
    fn from(s: String) -> Self {
        GameStatus::from_upstream(&s)
    }
}

/// Lifecycle of the fantasy matchup itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchupStatus {
    Scheduled,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupMetadata {
    pub status: MatchupStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub is_playoff: bool,
    pub is_chopped: bool,
    pub is_eliminated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub team_id: TeamId,
    pub owner_name: String,
    pub record: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamScore {
    pub actual: f64,
    pub projected: f64,
    pub win_probability: Option<f64>,
    /// Actual score minus the opponent's actual score.
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub info: TeamInfo,
    pub score: TeamScore,
    pub roster: Vec<PlayerSnapshot>,
}

impl TeamSnapshot {
    pub fn starters(&self) -> impl Iterator<Item = &PlayerSnapshot> {
        self.roster.iter().filter(|p| p.context.is_starter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub player_id: PlayerId,
    pub sleeper_id: Option<String>,
    pub espn_id: Option<String>,
    pub full_name: String,
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMetrics {
    pub current_score: f64,
    pub projected_score: f64,
    /// Current minus projected score.
    pub delta: f64,
    pub last_activity: Option<DateTime<Utc>>,
    pub game_status: Option<GameStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerContext {
    pub position: String,
    pub lineup_slot: Option<String>,
    pub is_starter: bool,
    pub team: Option<String>,
    pub injury_status: Option<String>,
    pub jersey_number: Option<String>,
    pub kickoff_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub identity: PlayerIdentity,
    pub metrics: PlayerMetrics,
    pub context: PlayerContext,
}

/// One head-to-head matchup, oriented from the user's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupSnapshot {
    pub id: MatchupId,
    pub metadata: MatchupMetadata,
    pub my_team: TeamSnapshot,
    pub opponent_team: TeamSnapshot,
    pub league: LeagueDescriptor,
    pub last_updated: DateTime<Utc>,
}

impl MatchupSnapshot {
    pub fn teams(&self) -> [&TeamSnapshot; 2] {
        [&self.my_team, &self.opponent_team]
    }

    /// True when any starter on either side is in a game that is underway.
    pub fn has_live_starter(&self) -> bool {
        self.teams().into_iter().flat_map(|t| t.starters()).any(|p| {
            p.metrics
                .game_status
                .map(GameStatus::is_live)
                .unwrap_or(false)
        })
    }
}

/// Load state of one league cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    Skeleton,
    Refreshing,
    Ready,
    Failed { reason: String },
}

/// Point-in-time view of one league entry, as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSnapshot {
    pub key: CacheKey,
    pub league: LeagueDescriptor,
    pub load_state: LoadState,
    pub matchups: Vec<MatchupSnapshot>,
    pub last_refreshed: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn league(id: &str) -> LeagueDescriptor {
        LeagueDescriptor {
            league_id: id.to_string(),
            name: format!("League {id}"),
            platform: Platform::Sleeper,
            season: 2024,
            avatar_url: None,
        }
    }

    pub fn player(id: &str, score: f64, status: Option<GameStatus>) -> PlayerSnapshot {
        PlayerSnapshot {
            id: id.to_string(),
            identity: PlayerIdentity {
                player_id: id.to_string(),
                sleeper_id: Some(id.to_string()),
                espn_id: None,
                full_name: format!("Player {id}"),
                short_name: None,
            },
            metrics: PlayerMetrics {
                current_score: score,
                projected_score: 10.0,
                delta: score - 10.0,
                last_activity: None,
                game_status: status,
            },
            context: PlayerContext {
                position: "WR".to_string(),
                lineup_slot: Some("WR".to_string()),
                is_starter: true,
                team: Some("KC".to_string()),
                injury_status: None,
                jersey_number: None,
                kickoff_time: None,
            },
        }
    }

    pub fn team(id: &str, roster: Vec<PlayerSnapshot>) -> TeamSnapshot {
        TeamSnapshot {
            info: TeamInfo {
                team_id: id.to_string(),
                owner_name: format!("Owner {id}"),
                record: Some("3-1".to_string()),
                avatar_url: None,
            },
            score: TeamScore {
                actual: roster.iter().map(|p| p.metrics.current_score).sum(),
                projected: 100.0,
                win_probability: None,
                margin: 0.0,
            },
            roster,
        }
    }

    pub fn matchup(mine: Vec<PlayerSnapshot>, theirs: Vec<PlayerSnapshot>) -> MatchupSnapshot {
        MatchupSnapshot {
            id: MatchupId {
                league_id: "L1".to_string(),
                matchup_id: "M1".to_string(),
                platform: Platform::Sleeper,
                week: 5,
            },
            metadata: MatchupMetadata {
                status: MatchupStatus::InProgress,
                start_time: None,
                is_playoff: false,
                is_chopped: false,
                is_eliminated: false,
            },
            my_team: team("A", mine),
            opponent_team: team("B", theirs),
            league: league("L1"),
            last_updated: Utc::now(),
        }
    }
}
