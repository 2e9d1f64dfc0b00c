//! In-memory fantasy league matchup cache.
//!
//! Aggregates per-league matchup data from upstream providers, hydrates
//! single matchups on demand with at most one fetch in flight, refreshes on a
//! live-game-aware TTL, tracks which players changed between refreshes and
//! streams league snapshots to observers.

pub mod config;
pub mod error;
pub mod provider;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod week;

pub use error::{ProviderError, StoreError, StoreResult};
pub use provider::{LeagueProvider, ProviderFactory};
pub use store::{CacheKey, LeagueSubscription, MatchupDataStore, TtlPolicy};
