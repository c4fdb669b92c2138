//! Consumer-facing view of a game for one user. Purely derived; holds no
//! authority over the game.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::GameStore,
        models::{
            BlackCardEntity, GameEntity, GameStatus, HandEntity, RoundEntity, RoundStatus,
            WhiteCardEntity,
        },
        storage::StorageResult,
    },
    state::{
        rules,
        view::{GameSnapshot, GameWatch},
    },
};

/// One submission as shown to a given viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedSubmission {
    pub player_id: String,
    /// Hidden from other players until the round is judged.
    pub cards: Option<Vec<WhiteCardEntity>>,
}

/// UI-facing state of a game for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub game_id: Uuid,
    pub user_id: String,
    pub status: GameStatus,
    pub is_host: bool,
    pub is_judge: bool,
    pub is_player: bool,
    pub round_number: u32,
    pub round_status: Option<RoundStatus>,
    pub judge_id: Option<String>,
    pub black_card: Option<BlackCardEntity>,
    pub submissions: Vec<ProjectedSubmission>,
    pub expected_submissions: usize,
    pub has_submitted: bool,
    pub winner_id: Option<String>,
    pub winning_cards: Option<Vec<WhiteCardEntity>>,
    /// Scores sorted for display, highest first; ties keep join order.
    pub scores: Vec<(String, u32)>,
    pub standing_winner: Option<String>,
    pub seconds_left: Option<u64>,
    pub next_round_in: Option<u64>,
    pub hand: Vec<WhiteCardEntity>,
    pub pending_cards: usize,
}

fn seconds_until(deadline: SystemTime, now: SystemTime) -> u64 {
    deadline
        .duration_since(now)
        .map_or(0, |left| left.as_secs_f64().ceil() as u64)
}

/// Derive the projection of `game` for `user`.
pub fn project(
    user: &str,
    game: &GameEntity,
    round: Option<&RoundEntity>,
    hand: Option<&HandEntity>,
    now: SystemTime,
    judging_timeout: Duration,
) -> Projection {
    // A round from a previous number can linger while subscriptions catch up.
    let round = round.filter(|round| round.round_number == game.current_round);
    let is_player = game.player_uids.iter().any(|id| id == user);
    let is_judge = round.is_some_and(|round| round.judge_id == user);
    let round_status = round.map(|round| round.status);
    let reveal = matches!(
        round_status,
        Some(RoundStatus::Judging | RoundStatus::Complete)
    );

    let submissions = round
        .map(|round| {
            rules::ordered_submissions(round)
                .into_iter()
                .map(|(player_id, submission)| ProjectedSubmission {
                    player_id: player_id.to_owned(),
                    cards: (reveal || player_id == user).then(|| submission.cards.clone()),
                })
                .collect()
        })
        .unwrap_or_default();

    let expected_submissions = round.map_or(0, |round| {
        game.player_uids
            .iter()
            .filter(|id| **id != round.judge_id)
            .count()
    });

    let mut scores: Vec<(String, u32)> = game
        .scores
        .iter()
        .map(|(id, score)| (id.clone(), *score))
        .collect();
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let seconds_left = match game.status {
        GameStatus::Playing | GameStatus::Judging => round
            .and_then(|round| rules::phase_deadline(game, round, judging_timeout))
            .map(|deadline| seconds_until(deadline, now)),
        _ => None,
    };
    let next_round_in = match game.status {
        GameStatus::RoundEnd => game.next_round_at.map(|at| seconds_until(at, now)),
        _ => None,
    };

    Projection {
        game_id: game.id,
        user_id: user.to_owned(),
        status: game.status,
        is_host: game.host_id == user,
        is_judge,
        is_player,
        round_number: game.current_round,
        round_status,
        judge_id: round.map(|round| round.judge_id.clone()),
        black_card: round.map(|round| round.black_card.clone()),
        submissions,
        expected_submissions,
        has_submitted: round.is_some_and(|round| round.submissions.contains_key(user)),
        winner_id: round.and_then(|round| round.winner_id.clone()),
        winning_cards: round.and_then(|round| round.winning_cards.clone()),
        scores,
        standing_winner: rules::game_winner(&game.scores, game.settings.winning_score)
            .map(str::to_owned),
        seconds_left,
        next_round_in,
        hand: hand.map(|hand| hand.cards.clone()).unwrap_or_default(),
        pending_cards: game.pending_deals.get(user).map_or(0, Vec::len),
    }
}

fn project_snapshot(
    user: &str,
    snapshot: &GameSnapshot,
    judging_timeout: Duration,
) -> Option<Projection> {
    let game = snapshot.game.as_ref()?;
    Some(project(
        user,
        game,
        snapshot.round.as_ref(),
        snapshot.hand.as_ref(),
        SystemTime::now(),
        judging_timeout,
    ))
}

/// Publishes a fresh [`Projection`] whenever a watched document changes, and
/// once per second so countdowns stay current.
pub struct ProjectionFeed {
    rx: watch::Receiver<Option<Projection>>,
    task: JoinHandle<()>,
}

impl ProjectionFeed {
    pub async fn start(
        store: Arc<dyn GameStore>,
        game_id: Uuid,
        user: &str,
        judging_timeout: Duration,
    ) -> StorageResult<Self> {
        let mut view = GameWatch::open(store, game_id, user).await?;
        let user = user.to_owned();
        let initial = project_snapshot(&user, &view.snapshot(), judging_timeout);
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                    changed = view.changed() => match changed {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => {
                            warn!(game_id = %game_id, error = %err, "projection feed lost its subscription");
                            break;
                        }
                    },
                }

                let next = project_snapshot(&user, &view.snapshot(), judging_timeout);
                tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }
            debug!(game_id = %game_id, user = %user, "projection feed stopped");
        });

        Ok(Self { rx, task })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Projection>> {
        self.rx.clone()
    }
}

impl Drop for ProjectionFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::dao::models::{GameSettingsEntity, SubmissionEntity};

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn card(id: &str) -> WhiteCardEntity {
        WhiteCardEntity {
            id: id.into(),
            text: id.to_uppercase(),
        }
    }

    fn game() -> GameEntity {
        let mut scores = IndexMap::new();
        scores.insert("a".to_string(), 1);
        scores.insert("b".to_string(), 3);
        scores.insert("c".to_string(), 1);
        let mut pending_deals = IndexMap::new();
        pending_deals.insert("c".to_string(), vec!["w-9".to_string()]);
        GameEntity {
            id: Uuid::nil(),
            host_id: "a".into(),
            player_uids: vec!["a".into(), "b".into(), "c".into()],
            status: GameStatus::Playing,
            current_round: 2,
            current_judge_index: 1,
            settings: GameSettingsEntity {
                winning_score: 3,
                cards_per_hand: 7,
                deck_id: "default".into(),
                round_timeout_secs: 120,
            },
            scores,
            deck: Default::default(),
            pending_deals,
            next_round_at: None,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    fn round(status: RoundStatus) -> RoundEntity {
        let mut submissions = IndexMap::new();
        submissions.insert(
            "c".to_string(),
            SubmissionEntity {
                cards: vec![card("w-c")],
                submitted_at: at(110),
            },
        );
        submissions.insert(
            "a".to_string(),
            SubmissionEntity {
                cards: vec![card("w-a")],
                submitted_at: at(105),
            },
        );
        RoundEntity {
            round_number: 2,
            judge_id: "b".into(),
            black_card: BlackCardEntity {
                id: "b-default-3".into(),
                text: "_".into(),
                pick: 1,
            },
            submissions,
            winner_id: None,
            winning_cards: None,
            status,
            started_at: at(100),
            judging_started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn submitting_hides_other_players_cards() {
        let game = game();
        let round = round(RoundStatus::Submitting);
        let view = project("a", &game, Some(&round), None, at(130), Duration::from_secs(60));

        assert!(view.is_host);
        assert!(!view.is_judge);
        assert!(view.has_submitted);
        assert_eq!(view.expected_submissions, 2);
        assert_eq!(view.submissions[0].player_id, "a");
        assert!(view.submissions[0].cards.is_some());
        assert_eq!(view.submissions[1].player_id, "c");
        assert!(view.submissions[1].cards.is_none());
        assert_eq!(view.seconds_left, Some(90));
    }

    #[test]
    fn judging_reveals_cards_to_the_judge() {
        let game = GameEntity {
            status: GameStatus::Judging,
            ..game()
        };
        let mut round = round(RoundStatus::Judging);
        round.judging_started_at = Some(at(150));
        let view = project("b", &game, Some(&round), None, at(160), Duration::from_secs(60));

        assert!(view.is_judge);
        assert!(!view.is_host);
        assert!(view.submissions.iter().all(|entry| entry.cards.is_some()));
        assert_eq!(view.seconds_left, Some(50));
    }

    #[test]
    fn scores_and_winner_are_derived() {
        let game = game();
        let view = project("c", &game, None, None, at(0), Duration::from_secs(60));

        assert_eq!(view.scores[0], ("b".to_string(), 3));
        assert_eq!(view.scores[1].0, "a");
        assert_eq!(view.standing_winner.as_deref(), Some("b"));
        assert_eq!(view.pending_cards, 1);
        assert!(view.round_status.is_none());
    }

    #[test]
    fn round_end_exposes_the_countdown() {
        let game = GameEntity {
            status: GameStatus::RoundEnd,
            next_round_at: Some(at(204)),
            ..game()
        };
        let view = project("a", &game, None, None, at(200), Duration::from_secs(60));
        assert_eq!(view.next_round_in, Some(4));
        assert_eq!(view.seconds_left, None);
    }
}
