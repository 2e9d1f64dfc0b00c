use thiserror::Error;

use crate::snapshot::MatchupId;

/// Failure reported by an upstream league provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the matchup store.
///
/// Cloneable so that a single in-flight fetch can hand the same outcome to
/// every caller awaiting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("league {league_id} (week {week}) has not been warmed")]
    LeagueNotWarmed { league_id: String, week: u32 },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("could not identify the user's team in league {league_id}")]
    TeamNotIdentified { league_id: String },

    #[error("no matchup for team {team_id} in league {league_id}")]
    MatchupNotFound { league_id: String, team_id: String },

    #[error("fetch for {0} was cancelled")]
    Cancelled(MatchupId),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
