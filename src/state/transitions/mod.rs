//! Transition protocol: every legal state change of a game is one atomic
//! transaction. Preconditions are evaluated on data read inside the
//! transaction, so a client that loses a race gets a precondition failure or
//! a conflict, never a half-applied change.

mod lobby;
mod round;

use thiserror::Error;

use crate::{
    dao::{
        models::{GameEntity, GameStatus, RoundEntity, RoundStatus},
        storage::StorageError,
    },
    state::state_machine::{InvalidTransition, StatusEvent, next_game_status, next_round_status},
};

pub use self::lobby::{create_game, force_end_game, join_game, kick_player, leave_game};
pub use self::round::{
    AdvanceOutcome, AutoPick, SubmitOutcome, WinnerOutcome, advance_round, auto_submit,
    claim_deal, schedule_round_advance, select_winner, skip_countdown, start_game,
    submit_cards,
};

pub type TransitionResult<T> = Result<T, TransitionError>;

/// Why a transition did not commit.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// Expected under concurrent clients; nothing was written.
    #[error("precondition failed: {0}")]
    Precondition(#[from] Precondition),
    /// Another writer committed first; nothing was written.
    #[error("transaction conflicted with a concurrent write")]
    Conflict,
    /// A document the operation relies on is missing or malformed.
    #[error("data integrity problem: {0}")]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("storage failure")]
    Storage(#[source] StorageError),
}

impl TransitionError {
    /// Whether this failure is a normal outcome of racing clients.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            TransitionError::Precondition(_) | TransitionError::Conflict
        )
    }
}

impl From<StorageError> for TransitionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { .. } => TransitionError::Conflict,
            StorageError::Corrupt { key, reason } => {
                TransitionError::Integrity(IntegrityError::Corrupt { key, reason })
            }
            other => TransitionError::Storage(other),
        }
    }
}

/// Unmet precondition of a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("game is {actual:?}, expected {expected:?}")]
    GameStatus {
        expected: GameStatus,
        actual: GameStatus,
    },
    #[error("round is {actual:?}, expected {expected:?}")]
    RoundStatus {
        expected: RoundStatus,
        actual: RoundStatus,
    },
    #[error("round {requested} is not the current round ({current})")]
    StaleRound { requested: u32, current: u32 },
    #[error("`{user}` is not the host")]
    NotHost { user: String },
    #[error("`{user}` is neither the host nor the judge of this round")]
    NotHostOrJudge { user: String },
    #[error("the game has finished")]
    GameFinished,
    #[error("`{user}` is not a player of this game")]
    NotPlayer { user: String },
    #[error("the host cannot kick themselves")]
    KickSelf,
    #[error("{count} player(s) cannot start a game")]
    NotEnoughPlayers { count: usize },
    #[error("deck `{deck_id}` has too few cards for this table")]
    DeckTooSmall { deck_id: String },
    #[error("hands of {cards_per_hand} card(s) cannot answer a pick-{pick} black card")]
    HandSmallerThanPick { cards_per_hand: usize, pick: u32 },
    #[error("`{user}` has no pending deal")]
    NoPendingDeal { user: String },
    #[error("the judge does not submit cards")]
    JudgeCannotSubmit,
    #[error("`{user}` already submitted this round")]
    AlreadySubmitted { user: String },
    #[error("selection does not match the black card or the hand")]
    InvalidSubmission,
    #[error("hand of `{user}` cannot cover the black card")]
    HandTooSmall { user: String },
    #[error("`{player}` has no submission this round")]
    NoSubmission { player: String },
    #[error("the next round is already scheduled")]
    AdvanceAlreadyScheduled,
}

/// Documents that should exist (or parse) but do not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("missing document `{key}`")]
    MissingDocument { key: String },
    #[error("corrupt document `{key}`: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("card `{card_id}` is not part of deck `{deck_id}`")]
    UnknownCard { card_id: String, deck_id: String },
    #[error("judge index {index} is outside a roster of {count}")]
    JudgeOutOfRange { index: usize, count: usize },
}

fn require_game_status(game: &GameEntity, expected: GameStatus) -> Result<(), Precondition> {
    if game.status != expected {
        return Err(Precondition::GameStatus {
            expected,
            actual: game.status,
        });
    }
    Ok(())
}

fn require_round_status(round: &RoundEntity, expected: RoundStatus) -> Result<(), Precondition> {
    if round.status != expected {
        return Err(Precondition::RoundStatus {
            expected,
            actual: round.status,
        });
    }
    Ok(())
}

fn require_current_round(game: &GameEntity, requested: u32) -> Result<(), Precondition> {
    if game.current_round != requested {
        return Err(Precondition::StaleRound {
            requested,
            current: game.current_round,
        });
    }
    Ok(())
}

fn require_host(game: &GameEntity, user: &str) -> Result<(), Precondition> {
    if game.host_id != user {
        return Err(Precondition::NotHost { user: user.into() });
    }
    Ok(())
}

fn apply_game_event(game: &mut GameEntity, event: StatusEvent) -> TransitionResult<()> {
    game.status = next_game_status(game.status, event)?;
    Ok(())
}

fn apply_round_event(round: &mut RoundEntity, event: StatusEvent) -> TransitionResult<()> {
    round.status = next_round_status(round.status, event)?;
    Ok(())
}
