//! Pure game rules. Nothing here performs I/O or mutates state; the same
//! predicates gate client actions and are re-checked inside transactions.

use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use rand::{Rng, seq::IndexedRandom};

use crate::dao::models::{
    BlackCardEntity, GameEntity, RoundEntity, RoundStatus, SubmissionEntity, WhiteCardEntity,
};

/// Smallest roster that can start a match.
pub const MIN_PLAYERS: usize = 3;

/// Whether the lobby has enough players to start.
pub fn can_start(player_ids: &[String]) -> bool {
    player_ids.len() >= MIN_PLAYERS
}

/// Whether `selected` is exactly `pick` distinct cards, all present in `hand`.
pub fn is_valid_submission(
    hand: &[WhiteCardEntity],
    selected: &[String],
    black_card: &BlackCardEntity,
) -> bool {
    if selected.len() != black_card.pick as usize {
        return false;
    }
    let mut seen = HashSet::with_capacity(selected.len());
    selected
        .iter()
        .all(|id| seen.insert(id) && hand.iter().any(|card| &card.id == id))
}

/// Whether every non-judge player currently in the game has submitted.
pub fn is_round_complete(
    submissions: &IndexMap<String, SubmissionEntity>,
    player_ids: &[String],
    judge_id: &str,
) -> bool {
    player_ids
        .iter()
        .filter(|id| id.as_str() != judge_id)
        .all(|id| submissions.contains_key(id))
}

/// Judge index for the next round.
pub fn next_judge_index(current: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (current + 1) % count
}

/// First player, in score order, who reached `winning_score`.
pub fn game_winner(scores: &IndexMap<String, u32>, winning_score: u32) -> Option<&str> {
    scores
        .iter()
        .find(|(_, score)| **score >= winning_score)
        .map(|(id, _)| id.as_str())
}

/// Sort key that gives every client the same judge review order.
pub fn submission_order_key(player_id: &str, round_number: u32) -> String {
    format!("{player_id}{round_number}")
}

/// Submissions in deterministic review order: keys compare case-insensitively
/// first, with the exact key breaking ties.
pub fn ordered_submissions(round: &RoundEntity) -> Vec<(&str, &SubmissionEntity)> {
    let mut entries: Vec<(&str, &SubmissionEntity)> = round
        .submissions
        .iter()
        .map(|(id, submission)| (id.as_str(), submission))
        .collect();
    entries.sort_by_cached_key(|(id, _)| {
        let key = submission_order_key(id, round.round_number);
        (key.to_lowercase(), key)
    });
    entries
}

/// Deterministic auto-pick: the first `pick` cards of the hand.
pub fn first_available_pick(hand: &[WhiteCardEntity], pick: u32) -> Option<Vec<String>> {
    let pick = pick as usize;
    if hand.len() < pick {
        return None;
    }
    Some(hand.iter().take(pick).map(|card| card.id.clone()).collect())
}

/// Random subset of the hand, used when one client submits for another.
pub fn random_pick<R: Rng + ?Sized>(
    hand: &[WhiteCardEntity],
    pick: u32,
    rng: &mut R,
) -> Option<Vec<String>> {
    let pick = pick as usize;
    if hand.len() < pick {
        return None;
    }
    Some(
        hand.choose_multiple(rng, pick)
            .map(|card| card.id.clone())
            .collect(),
    )
}

/// Instant the current phase of `round` times out, if it can.
///
/// Submissions run from `started_at` for the game's round timeout; judging
/// runs from `judging_started_at` and never outlasts the submission timeout.
pub fn phase_deadline(
    game: &GameEntity,
    round: &RoundEntity,
    judging_timeout: Duration,
) -> Option<SystemTime> {
    let submission = Duration::from_secs(game.settings.round_timeout_secs);
    match round.status {
        RoundStatus::Submitting => Some(round.started_at + submission),
        RoundStatus::Judging => {
            let since = round.judging_started_at.unwrap_or(round.started_at);
            Some(since + judging_timeout.min(submission))
        }
        RoundStatus::Complete => None,
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn card(id: &str) -> WhiteCardEntity {
        WhiteCardEntity {
            id: id.into(),
            text: format!("text of {id}"),
        }
    }

    fn black(pick: u32) -> BlackCardEntity {
        BlackCardEntity {
            id: "b-test-0".into(),
            text: "_ and _".into(),
            pick,
        }
    }

    fn submission() -> SubmissionEntity {
        SubmissionEntity {
            cards: vec![],
            submitted_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn start_needs_three_players() {
        assert!(!can_start(&ids(&["a", "b"])));
        assert!(can_start(&ids(&["a", "b", "c"])));
    }

    #[test]
    fn submission_must_match_pick_and_hand() {
        let hand = vec![card("w1"), card("w2"), card("w3")];
        assert!(is_valid_submission(&hand, &ids(&["w1", "w3"]), &black(2)));
        assert!(!is_valid_submission(&hand, &ids(&["w1"]), &black(2)));
        assert!(!is_valid_submission(&hand, &ids(&["w1", "w9"]), &black(2)));
    }

    #[test]
    fn duplicate_cards_are_rejected() {
        let hand = vec![card("w1"), card("w2")];
        assert!(!is_valid_submission(&hand, &ids(&["w1", "w1"]), &black(2)));
    }

    #[test]
    fn round_complete_ignores_judge_and_departed_players() {
        let mut submissions = IndexMap::new();
        submissions.insert("b".to_string(), submission());
        let players = ids(&["a", "b", "c"]);
        assert!(!is_round_complete(&submissions, &players, "a"));

        // A departed submitter no longer counts.
        let players = ids(&["a", "b"]);
        assert!(is_round_complete(&submissions, &players, "a"));
    }

    #[test]
    fn judge_rotation_visits_everyone_before_repeating() {
        let mut index = 0;
        let mut seen = vec![index];
        for _ in 0..3 {
            index = next_judge_index(index, 4);
            seen.push(index);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(next_judge_index(3, 4), 0);
        assert_eq!(next_judge_index(5, 0), 0);
    }

    #[test]
    fn winner_is_first_to_reach_threshold() {
        let mut scores = IndexMap::new();
        scores.insert("a".to_string(), 1);
        scores.insert("b".to_string(), 2);
        scores.insert("c".to_string(), 2);
        assert_eq!(game_winner(&scores, 2), Some("b"));
        assert_eq!(game_winner(&scores, 3), None);
    }

    #[test]
    fn review_order_is_stable_across_insertion_orders() {
        let make_round = |order: &[&str]| RoundEntity {
            round_number: 4,
            judge_id: "judge".into(),
            black_card: black(1),
            submissions: order
                .iter()
                .map(|id| (id.to_string(), submission()))
                .collect(),
            winner_id: None,
            winning_cards: None,
            status: RoundStatus::Judging,
            started_at: SystemTime::UNIX_EPOCH,
            judging_started_at: None,
            completed_at: None,
        };

        let first = make_round(&["zed", "amy", "kim"]);
        let second = make_round(&["kim", "zed", "amy"]);
        let order = |round: &RoundEntity| -> Vec<String> {
            ordered_submissions(round)
                .into_iter()
                .map(|(id, _)| id.to_string())
                .collect()
        };
        assert_eq!(order(&first), ids(&["amy", "kim", "zed"]));
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn review_order_ignores_case() {
        let round = RoundEntity {
            round_number: 1,
            judge_id: "judge".into(),
            black_card: black(1),
            submissions: ["Bob", "alice", "Alice"]
                .iter()
                .map(|id| (id.to_string(), submission()))
                .collect(),
            winner_id: None,
            winning_cards: None,
            status: RoundStatus::Judging,
            started_at: SystemTime::UNIX_EPOCH,
            judging_started_at: None,
            completed_at: None,
        };
        let order: Vec<&str> = ordered_submissions(&round)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(order, ["Alice", "alice", "Bob"]);
    }

    #[test]
    fn auto_picks_respect_hand_size() {
        let hand = vec![card("w1"), card("w2"), card("w3")];
        assert_eq!(first_available_pick(&hand, 2), Some(ids(&["w1", "w2"])));
        assert_eq!(first_available_pick(&hand, 4), None);

        let mut rng = StdRng::seed_from_u64(7);
        let picked = random_pick(&hand, 2, &mut rng).unwrap();
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);
        assert!(is_valid_submission(&hand, &picked, &black(2)));
    }

    #[test]
    fn judging_deadline_is_capped_by_submission_timeout() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let game = GameEntity {
            id: uuid::Uuid::nil(),
            host_id: "a".into(),
            player_uids: ids(&["a", "b", "c"]),
            status: crate::dao::models::GameStatus::Judging,
            current_round: 1,
            current_judge_index: 0,
            settings: crate::dao::models::GameSettingsEntity {
                winning_score: 5,
                cards_per_hand: 7,
                deck_id: "default".into(),
                round_timeout_secs: 30,
            },
            scores: IndexMap::new(),
            deck: Default::default(),
            pending_deals: IndexMap::new(),
            next_round_at: None,
            created_at: start,
            updated_at: start,
        };
        let mut round = RoundEntity {
            round_number: 1,
            judge_id: "a".into(),
            black_card: black(1),
            submissions: IndexMap::new(),
            winner_id: None,
            winning_cards: None,
            status: RoundStatus::Submitting,
            started_at: start,
            judging_started_at: None,
            completed_at: None,
        };

        assert_eq!(
            phase_deadline(&game, &round, Duration::from_secs(60)),
            Some(start + Duration::from_secs(30))
        );

        round.status = RoundStatus::Judging;
        round.judging_started_at = Some(start + Duration::from_secs(10));
        assert_eq!(
            phase_deadline(&game, &round, Duration::from_secs(60)),
            Some(start + Duration::from_secs(40))
        );
        assert_eq!(
            phase_deadline(&game, &round, Duration::from_secs(5)),
            Some(start + Duration::from_secs(15))
        );

        round.status = RoundStatus::Complete;
        assert_eq!(phase_deadline(&game, &round, Duration::from_secs(5)), None);
    }
}
