use thiserror::Error;

use crate::dao::models::{GameStatus, RoundStatus};

/// Events that drive game and round status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Host starts the match from the lobby.
    Start,
    /// The last outstanding submission arrived (or the last submitter left).
    AllSubmitted,
    /// Judge (or a corrective client) picked the round winner.
    WinnerSelected {
        /// Whether the winner reached the winning score.
        game_over: bool,
    },
    /// Next round begins.
    Advance,
    /// No black card is left to start another round.
    DeckExhausted,
    /// Host ends the match early.
    ForceEnd,
    /// Too few players remain to keep playing.
    RosterDepleted,
}

/// Status a transition was attempted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Game-level status.
    Game(GameStatus),
    /// Round-level status.
    Round(RoundStatus),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the entity was in when the invalid event was received.
    pub from: Status,
    /// The event that cannot be applied from this status.
    pub event: StatusEvent,
}

/// Whether rounds are being played (the match started and has not finished).
pub fn is_active(status: GameStatus) -> bool {
    matches!(
        status,
        GameStatus::Playing | GameStatus::Judging | GameStatus::RoundEnd
    )
}

/// Compute the next game status for `event`, if the transition is legal.
pub fn next_game_status(
    from: GameStatus,
    event: StatusEvent,
) -> Result<GameStatus, InvalidTransition> {
    let next = match (from, event) {
        (GameStatus::Finished, _) => {
            return Err(InvalidTransition {
                from: Status::Game(from),
                event,
            });
        }
        (GameStatus::Waiting, StatusEvent::Start) => GameStatus::Playing,
        (GameStatus::Playing, StatusEvent::AllSubmitted) => GameStatus::Judging,
        (GameStatus::Judging, StatusEvent::WinnerSelected { game_over: true }) => {
            GameStatus::Finished
        }
        (GameStatus::Judging, StatusEvent::WinnerSelected { game_over: false }) => {
            GameStatus::RoundEnd
        }
        (GameStatus::RoundEnd, StatusEvent::Advance) => GameStatus::Playing,
        (GameStatus::RoundEnd, StatusEvent::DeckExhausted) => GameStatus::Finished,
        (_, StatusEvent::ForceEnd) => GameStatus::Finished,
        (status, StatusEvent::RosterDepleted) if is_active(status) => GameStatus::Finished,
        (from, event) => {
            return Err(InvalidTransition {
                from: Status::Game(from),
                event,
            });
        }
    };

    Ok(next)
}

/// Compute the next round status for `event`, if the transition is legal.
///
/// Rounds only move forward: `submitting -> judging -> complete`.
pub fn next_round_status(
    from: RoundStatus,
    event: StatusEvent,
) -> Result<RoundStatus, InvalidTransition> {
    match (from, event) {
        (RoundStatus::Submitting, StatusEvent::AllSubmitted) => Ok(RoundStatus::Judging),
        (RoundStatus::Judging, StatusEvent::WinnerSelected { .. }) => Ok(RoundStatus::Complete),
        (from, event) => Err(InvalidTransition {
            from: Status::Round(from),
            event,
        }),
    }
}
