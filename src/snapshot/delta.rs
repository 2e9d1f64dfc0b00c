use std::collections::{HashMap, HashSet};

use super::{MatchupSnapshot, PlayerId, PlayerSnapshot};

/// Score movements at or below this are treated as rounding noise.
pub const SCORE_EPSILON: f64 = 0.01;

/// Scores are compared at the precision they are displayed with (tenths).
fn display_score(score: f64) -> f64 {
    (score * 10.0).round() / 10.0
}

/// Detect which players changed between two snapshots of the same matchup.
///
/// A player counts as changed when their displayed score (rounded to a
/// tenth) moved by more than [`SCORE_EPSILON`], their game status differs, or
/// their injury status differs. Rosters are matched by player id across both
/// teams, so upstream reordering never produces spurious changes. Players
/// present on only one side (lineup swaps, waiver adds) are not reported.
///
/// Rounding buckets scores, so detection follows the displayed value rather
/// than the raw distance: 10.04 -> 10.06 crosses a display boundary and is
/// reported, while 10.00 -> 10.04 stays at 10.0 and is not.
pub fn changed_players(old: &MatchupSnapshot, new: &MatchupSnapshot) -> HashSet<PlayerId> {
    let previous: HashMap<&str, &PlayerSnapshot> = old
        .teams()
        .into_iter()
        .flat_map(|t| t.roster.iter())
        .map(|p| (p.id.as_str(), p))
        .collect();

    new.teams()
        .into_iter()
        .flat_map(|t| t.roster.iter())
        .filter(|p| {
            previous
                .get(p.id.as_str())
                .map(|prev| player_changed(prev, p))
                .unwrap_or(false)
        })
        .map(|p| p.id.clone())
        .collect()
}

fn player_changed(prev: &PlayerSnapshot, curr: &PlayerSnapshot) -> bool {
    (display_score(prev.metrics.current_score) - display_score(curr.metrics.current_score)).abs()
        > SCORE_EPSILON
        || prev.metrics.game_status != curr.metrics.game_status
        || prev.context.injury_status != curr.context.injury_status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::{matchup, player};
    use crate::snapshot::GameStatus;

    #[test]
    fn test_no_change() {
        let m = matchup(vec![player("p1", 10.0, None)], vec![]);
        assert!(changed_players(&m, &m).is_empty());
    }

    #[test]
    fn test_score_within_tolerance_is_ignored() {
        let old = matchup(vec![player("p1", 10.0, None)], vec![]);
        let new = matchup(vec![player("p1", 10.02, None)], vec![]);
        assert!(changed_players(&old, &new).is_empty());
    }

    #[test]
    fn test_score_beyond_tolerance_is_reported() {
        let old = matchup(vec![player("p1", 10.0, None)], vec![]);
        let new = matchup(vec![player("p1", 10.2, None)], vec![]);
        let changed = changed_players(&old, &new);
        assert_eq!(changed.len(), 1);
        assert!(changed.contains("p1"));

        let nudged = matchup(vec![player("p1", 10.02, None)], vec![]);
        assert!(changed_players(&nudged, &new).contains("p1"));
    }

    #[test]
    fn test_score_compared_at_display_boundaries() {
        let low = matchup(vec![player("p1", 10.04, None)], vec![]);
        let high = matchup(vec![player("p1", 10.06, None)], vec![]);
        assert!(changed_players(&low, &high).contains("p1"));

        let flat = matchup(vec![player("p1", 10.0, None)], vec![]);
        assert!(changed_players(&flat, &low).is_empty());
    }

    #[test]
    fn test_game_status_change_is_reported() {
        let old = matchup(vec![], vec![player("p9", 0.0, Some(GameStatus::Pregame))]);
        let new = matchup(vec![], vec![player("p9", 0.0, Some(GameStatus::Live))]);
        assert!(changed_players(&old, &new).contains("p9"));
    }

    #[test]
    fn test_injury_change_is_reported() {
        let old = matchup(vec![player("p1", 3.0, None)], vec![]);
        let mut hurt = player("p1", 3.0, None);
        hurt.context.injury_status = Some("Questionable".to_string());
        let new = matchup(vec![hurt], vec![]);
        assert!(changed_players(&old, &new).contains("p1"));
    }

    #[test]
    fn test_reordered_roster_matches_by_id() {
        let old = matchup(
            vec![player("p1", 5.0, None), player("p2", 7.0, None)],
            vec![],
        );
        let new = matchup(
            vec![player("p2", 7.0, None), player("p1", 5.0, None)],
            vec![],
        );
        assert!(changed_players(&old, &new).is_empty());
    }

    #[test]
    fn test_changes_collected_across_both_teams() {
        let old = matchup(vec![player("p1", 1.0, None)], vec![player("p2", 1.0, None)]);
        let new = matchup(vec![player("p1", 2.0, None)], vec![player("p2", 8.0, None)]);
        let changed = changed_players(&old, &new);
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn test_new_player_not_reported() {
        let old = matchup(vec![player("p1", 1.0, None)], vec![]);
        let new = matchup(vec![player("p1", 1.0, None), player("p5", 6.0, None)], vec![]);
        assert!(changed_players(&old, &new).is_empty());
    }
}
