//! Timeout and failover supervision of a single (game, user) pair.
//!
//! Every connected client runs one. There is no leader: all corrective calls
//! go through the transition protocol, whose preconditions turn duplicate
//! attempts from several supervisors into harmless no-ops.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::mapref::entry::Entry;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        game_store::GameStore,
        models::{GameStatus, RoundStatus},
        storage::StorageResult,
    },
    state::{
        SharedState, SupervisorKey,
        deck::{Deck, DeckProvider},
        rules,
        transitions::{self, AutoPick, TransitionResult},
        view::{GameSnapshot, GameWatch},
    },
};

/// Deadlines the supervisor works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTimings {
    pub judging_timeout: Duration,
    pub advance_delay: Duration,
    pub host_grace: Duration,
    pub tick: Duration,
}

impl From<&AppConfig> for SupervisorTimings {
    fn from(config: &AppConfig) -> Self {
        Self {
            judging_timeout: config.judging_timeout,
            advance_delay: config.round_advance_delay,
            host_grace: config.host_grace,
            tick: config.supervisor_tick,
        }
    }
}

/// Corrective call chosen by a supervisor pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    ClaimDeal,
    AutoSubmit {
        round: u32,
        player: String,
        pick: AutoPick,
    },
    SelectWinner {
        round: u32,
        winner: String,
        award_point: bool,
    },
    ScheduleAdvance {
        at: SystemTime,
    },
    AdvanceRound,
}

fn elapsed(deadline: SystemTime, now: SystemTime) -> bool {
    now >= deadline
}

/// Decide which corrective calls `user` should attempt at `now`.
///
/// Own obligations fire at the phase deadline; calls made on behalf of other
/// players (host nudges, forced judging, countdown takeover) wait an extra
/// `host_grace` so the responsible client gets the first chance.
pub fn plan(
    user: &str,
    snapshot: &GameSnapshot,
    now: SystemTime,
    timings: &SupervisorTimings,
) -> Vec<SupervisorAction> {
    let mut actions = Vec::new();
    let Some(game) = snapshot.game.as_ref() else {
        return actions;
    };
    if game.status == GameStatus::Finished {
        return actions;
    }

    if game
        .pending_deals
        .get(user)
        .is_some_and(|cards| !cards.is_empty())
    {
        actions.push(SupervisorAction::ClaimDeal);
    }

    let is_host = game.host_id == user;
    let round = snapshot
        .round
        .as_ref()
        .filter(|round| round.round_number == game.current_round);

    match game.status {
        GameStatus::Playing | GameStatus::Judging => {
            let Some(round) = round else {
                return actions;
            };
            let Some(deadline) = rules::phase_deadline(game, round, timings.judging_timeout) else {
                return actions;
            };
            if !elapsed(deadline, now) {
                return actions;
            }
            let takeover = elapsed(deadline + timings.host_grace, now);

            match round.status {
                RoundStatus::Submitting => {
                    let outstanding = game
                        .player_uids
                        .iter()
                        .filter(|id| **id != round.judge_id)
                        .filter(|id| !round.submissions.contains_key(id.as_str()));
                    for player in outstanding {
                        if player == user {
                            actions.push(SupervisorAction::AutoSubmit {
                                round: round.round_number,
                                player: player.clone(),
                                pick: AutoPick::First,
                            });
                        } else if is_host && takeover {
                            actions.push(SupervisorAction::AutoSubmit {
                                round: round.round_number,
                                player: player.clone(),
                                pick: AutoPick::Random,
                            });
                        }
                    }
                }
                RoundStatus::Judging => {
                    let Some((first, _)) = rules::ordered_submissions(round).into_iter().next()
                    else {
                        return actions;
                    };
                    if round.judge_id == user {
                        actions.push(SupervisorAction::SelectWinner {
                            round: round.round_number,
                            winner: first.to_owned(),
                            award_point: true,
                        });
                    } else if is_host && takeover {
                        actions.push(SupervisorAction::SelectWinner {
                            round: round.round_number,
                            winner: first.to_owned(),
                            award_point: false,
                        });
                    }
                }
                RoundStatus::Complete => {}
            }
        }
        GameStatus::RoundEnd => match game.next_round_at {
            Some(at) => {
                if (is_host && elapsed(at, now)) || elapsed(at + timings.host_grace, now) {
                    actions.push(SupervisorAction::AdvanceRound);
                }
            }
            None if is_host => actions.push(SupervisorAction::ScheduleAdvance {
                at: now + timings.advance_delay,
            }),
            None => {
                let completed = round.and_then(|round| round.completed_at);
                if completed.is_some_and(|completed| {
                    elapsed(completed + timings.advance_delay + timings.host_grace, now)
                }) {
                    actions.push(SupervisorAction::AdvanceRound);
                }
            }
        },
        GameStatus::Waiting | GameStatus::Finished => {}
    }

    actions
}

/// Supervisor for one connected (game, user).
pub struct Supervisor {
    store: Arc<dyn GameStore>,
    decks: Arc<DeckProvider>,
    view: GameWatch,
    timings: SupervisorTimings,
    deck: Option<Arc<Deck>>,
}

impl Supervisor {
    pub async fn open(
        store: Arc<dyn GameStore>,
        decks: Arc<DeckProvider>,
        game_id: Uuid,
        user: &str,
        timings: SupervisorTimings,
    ) -> StorageResult<Self> {
        let view = GameWatch::open(store.clone(), game_id, user).await?;
        Ok(Self {
            store,
            decks,
            view,
            timings,
            deck: None,
        })
    }

    fn is_finished(&self) -> bool {
        self.view
            .snapshot()
            .game
            .is_some_and(|game| game.status == GameStatus::Finished)
    }

    async fn deck(&mut self, deck_id: &str) -> Arc<Deck> {
        if let Some(deck) = self.deck.as_ref().filter(|deck| deck.id == deck_id) {
            return deck.clone();
        }
        let deck = self.decks.resolve(self.store.as_ref(), deck_id).await;
        self.deck = Some(deck.clone());
        deck
    }

    /// One supervision pass over the latest snapshot. Returns the actions it
    /// attempted, whether or not they committed.
    pub async fn tick(&mut self, now: SystemTime) -> Vec<SupervisorAction> {
        let snapshot = self.view.snapshot();
        let actions = plan(self.view.user(), &snapshot, now, &self.timings);
        let Some(game) = snapshot.game else {
            return actions;
        };

        for action in &actions {
            let result = self.execute(action, &game.settings.deck_id).await;
            match result {
                Ok(()) => info!(
                    game_id = %game.id,
                    user = self.view.user(),
                    action = ?action,
                    "corrective action applied"
                ),
                Err(err) if err.is_expected() => debug!(
                    game_id = %game.id,
                    user = self.view.user(),
                    action = ?action,
                    reason = %err,
                    "corrective action skipped"
                ),
                Err(err) => warn!(
                    game_id = %game.id,
                    user = self.view.user(),
                    action = ?action,
                    error = %err,
                    "corrective action failed"
                ),
            }
        }
        actions
    }

    async fn execute(&mut self, action: &SupervisorAction, deck_id: &str) -> TransitionResult<()> {
        let store = self.store.clone();
        let game_id = self.view.game_id();
        match action {
            SupervisorAction::ClaimDeal => {
                let deck = self.deck(deck_id).await;
                transitions::claim_deal(store, game_id, self.view.user(), &deck).await?;
            }
            SupervisorAction::AutoSubmit {
                round,
                player,
                pick,
            } => {
                transitions::auto_submit(store, game_id, *round, player, *pick).await?;
            }
            SupervisorAction::SelectWinner {
                round,
                winner,
                award_point,
            } => {
                transitions::select_winner(
                    store,
                    game_id,
                    *round,
                    winner,
                    *award_point,
                    self.timings.advance_delay,
                )
                .await?;
            }
            SupervisorAction::ScheduleAdvance { at } => {
                transitions::schedule_round_advance(store, game_id, *at).await?;
            }
            SupervisorAction::AdvanceRound => {
                let deck = self.deck(deck_id).await;
                transitions::advance_round(store, game_id, &deck).await?;
            }
        }
        Ok(())
    }

    /// Drive passes from a ticker and from document changes until the game
    /// finishes or the subscription ends.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.timings.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = self.view.changed() => match changed {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => {
                            warn!(game_id = %self.view.game_id(), error = %err, "supervisor lost its subscription");
                            break;
                        }
                    },
                }

                if self.is_finished() {
                    info!(game_id = %self.view.game_id(), user = self.view.user(), "game finished; supervisor stopping");
                    break;
                }
                self.tick(SystemTime::now()).await;
            }
        })
    }
}

/// Running supervisor shared by every open stream of the same (game, user).
pub struct SupervisorSlot {
    connections: usize,
    task: JoinHandle<()>,
}

/// Keeps a supervisor alive; the last lease to drop stops it.
pub struct SupervisorLease {
    state: SharedState,
    key: SupervisorKey,
}

/// Start the supervisor for (`game_id`, `user`) or join the running one.
pub async fn acquire(
    state: &SharedState,
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    user: &str,
) -> StorageResult<SupervisorLease> {
    let key: SupervisorKey = (game_id, user.to_owned());
    // Only built once the slot counts it, so a failed open releases nothing.
    let lease = |key: SupervisorKey| SupervisorLease {
        state: state.clone(),
        key,
    };

    if let Some(mut slot) = state.supervisors().get_mut(&key) {
        if !slot.task.is_finished() {
            slot.connections += 1;
            return Ok(lease(key.clone()));
        }
    }

    let supervisor = Supervisor::open(
        store,
        state.decks().clone(),
        game_id,
        user,
        SupervisorTimings::from(state.config()),
    )
    .await?;
    let task = supervisor.spawn();

    match state.supervisors().entry(key.clone()) {
        Entry::Occupied(mut entry) if !entry.get().task.is_finished() => {
            // Another stream started one while we were subscribing.
            task.abort();
            entry.get_mut().connections += 1;
        }
        Entry::Occupied(mut entry) => {
            let connections = entry.get().connections + 1;
            entry.insert(SupervisorSlot { connections, task });
        }
        Entry::Vacant(entry) => {
            entry.insert(SupervisorSlot {
                connections: 1,
                task,
            });
            debug!(game_id = %game_id, user, "supervisor started");
        }
    }
    Ok(lease(key))
}

impl Drop for SupervisorLease {
    fn drop(&mut self) {
        let supervisors = self.state.supervisors();
        let last = match supervisors.get_mut(&self.key) {
            Some(mut slot) => {
                slot.connections = slot.connections.saturating_sub(1);
                slot.connections == 0
            }
            None => false,
        };
        if !last {
            return;
        }
        if let Some((_, slot)) = supervisors.remove_if(&self.key, |_, slot| slot.connections == 0) {
            slot.task.abort();
            debug!(game_id = %self.key.0, user = %self.key.1, "supervisor stopped");
        }
    }
}
