//! Battle winner rules and round winner sets.

use std::collections::HashSet;

use super::models::{Battle, UserId};

/// Pick the winner of a battle from each player's summed points
///
/// A player who scored while the opponent scored exactly zero wins outright.
/// Otherwise the higher total wins and a tie goes to the lower user id.
pub fn resolve_winner(player1: UserId, score1: i64, player2: UserId, score2: i64) -> UserId {
    if score1 > 0 && score2 == 0 {
        return player1;
    }
    if score2 > 0 && score1 == 0 {
        return player2;
    }
    match score1.cmp(&score2) {
        std::cmp::Ordering::Greater => player1,
        std::cmp::Ordering::Less => player2,
        std::cmp::Ordering::Equal => player1.min(player2),
    }
}

/// Users advancing from a round
///
/// Winners of decided battles come first in battle order, then bye recipients
/// who are not already listed. A battle whose two slots hold the same user
/// counts as a bye for that user.
pub fn compute_round_winners(battles: &[Battle], byes: &[UserId]) -> Vec<UserId> {
    let mut seen = HashSet::new();
    let mut winners = Vec::new();

    let decided = battles
        .iter()
        .filter(|b| b.status.is_decided())
        .filter_map(|b| b.winner_id);
    for winner in decided {
        if seen.insert(winner) {
            winners.push(winner);
        }
    }

    let degenerate = battles
        .iter()
        .filter(|b| b.player1_id == b.player2_id)
        .map(|b| b.player1_id);

    for user in byes.iter().copied().chain(degenerate) {
        if seen.insert(user) {
            winners.push(user);
        }
    }

    winners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::models::BattleStatus;
    use chrono::Utc;

    fn battle(
        id: i64,
        p1: UserId,
        p2: UserId,
        status: BattleStatus,
        winner: Option<UserId>,
    ) -> Battle {
        Battle {
            id,
            tournament_id: 1,
            round: 1,
            player1_id: p1,
            player2_id: p2,
            status,
            player1_score: None,
            player2_score: None,
            winner_id: winner,
            is_draw: false,
            forfeit_reason: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            timeout_at: None,
            battle_duration_secs: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_higher_total_wins() {
        assert_eq!(resolve_winner(1, 7, 2, 9), 2);
        assert_eq!(resolve_winner(1, 9, 2, 7), 1);
    }

    #[test]
    fn test_tie_goes_to_lower_id() {
        assert_eq!(resolve_winner(4, 5, 9, 5), 4);
        assert_eq!(resolve_winner(9, 5, 4, 5), 4);
        assert_eq!(resolve_winner(3, 0, 8, 0), 3);
    }

    #[test]
    fn test_scoring_against_zero_wins() {
        assert_eq!(resolve_winner(1, 0, 2, 1), 2);
        assert_eq!(resolve_winner(1, 3, 2, 0), 1);
    }

    #[test]
    fn test_negative_totals_fall_through_to_comparison() {
        // -2 is not "exactly zero", so the plain comparison applies
        assert_eq!(resolve_winner(1, -2, 2, 0), 2);
        assert_eq!(resolve_winner(1, 4, 2, -1), 1);
    }

    #[test]
    fn test_winners_in_battle_order_then_byes() {
        let battles = vec![
            battle(1, 1, 5, BattleStatus::Completed, Some(5)),
            battle(2, 2, 4, BattleStatus::Forfeited, Some(2)),
        ];
        assert_eq!(compute_round_winners(&battles, &[3]), vec![5, 2, 3]);
    }

    #[test]
    fn test_undecided_and_cancelled_battles_contribute_nothing() {
        let battles = vec![
            battle(1, 1, 5, BattleStatus::Scheduled, None),
            battle(2, 2, 4, BattleStatus::Cancelled, None),
            battle(3, 6, 7, BattleStatus::Completed, Some(6)),
        ];
        assert_eq!(compute_round_winners(&battles, &[]), vec![6]);
    }

    #[test]
    fn test_byes_and_degenerate_battles_are_deduplicated() {
        let battles = vec![
            battle(1, 3, 3, BattleStatus::Scheduled, None),
            battle(2, 1, 2, BattleStatus::Completed, Some(1)),
        ];
        assert_eq!(compute_round_winners(&battles, &[3, 1]), vec![1, 3]);
    }

    #[test]
    fn test_empty_round_has_no_winners() {
        assert!(compute_round_winners(&[], &[]).is_empty());
    }
}
