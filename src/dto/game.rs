use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{GameEntity, GameSettingsEntity},
    dto::{format_system_time, validation::validate_user_id},
    state::transitions::{AdvanceOutcome, SubmitOutcome, WinnerOutcome},
};

/// Payload used to open a new lobby. Omitted settings use the configured defaults.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CreateGameRequest {
    #[validate(range(min = 1, max = 50))]
    pub winning_score: Option<u32>,
    #[validate(range(min = 1, max = 20))]
    pub cards_per_hand: Option<usize>,
    #[validate(length(min = 1, max = 64))]
    pub deck_id: Option<String>,
    /// Submission phase timeout, in seconds.
    #[validate(range(min = 10, max = 900))]
    pub round_timeout_secs: Option<u64>,
}

impl CreateGameRequest {
    /// Fill the omitted fields from `defaults`.
    pub fn into_settings(self, defaults: &GameSettingsEntity) -> GameSettingsEntity {
        GameSettingsEntity {
            winning_score: self.winning_score.unwrap_or(defaults.winning_score),
            cards_per_hand: self.cards_per_hand.unwrap_or(defaults.cards_per_hand),
            deck_id: self.deck_id.unwrap_or_else(|| defaults.deck_id.clone()),
            round_timeout_secs: self
                .round_timeout_secs
                .unwrap_or(defaults.round_timeout_secs),
        }
    }
}

/// Cards chosen by a player for the given round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitCardsRequest {
    pub round: u32,
    #[validate(length(min = 1, max = 10))]
    pub card_ids: Vec<String>,
}

/// Judge's pick for the given round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SelectWinnerRequest {
    pub round: u32,
    #[validate(custom(function = "validate_user_id"))]
    pub winner_id: String,
}

/// Player the host wants removed from the lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct KickPlayerRequest {
    #[validate(custom(function = "validate_user_id"))]
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Settings of a game as exposed to clients.
pub struct GameSettingsSummary {
    pub winning_score: u32,
    pub cards_per_hand: usize,
    pub deck_id: String,
    pub round_timeout_secs: u64,
}

impl From<GameSettingsEntity> for GameSettingsSummary {
    fn from(settings: GameSettingsEntity) -> Self {
        Self {
            winning_score: settings.winning_score,
            cards_per_hand: settings.cards_per_hand,
            deck_id: settings.deck_id,
            round_timeout_secs: settings.round_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// One line of the scoreboard.
pub struct ScoreEntry {
    pub player_id: String,
    pub score: u32,
}

/// Summary returned by lobby operations and listings.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct GameSummary {
    pub id: Uuid,
    pub host_id: String,
    /// `waiting`, `playing`, `judging`, `round_end` or `finished`.
    pub status: String,
    pub players: Vec<String>,
    pub current_round: u32,
    pub scores: Vec<ScoreEntry>,
    pub settings: GameSettingsSummary,
    pub next_round_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) fn status_label<T: Serialize>(status: &T) -> String {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(label)) => label,
        _ => "unknown".into(),
    }
}

impl From<GameEntity> for GameSummary {
    fn from(game: GameEntity) -> Self {
        Self {
            id: game.id,
            host_id: game.host_id,
            status: status_label(&game.status),
            players: game.player_uids,
            current_round: game.current_round,
            scores: game
                .scores
                .into_iter()
                .map(|(player_id, score)| ScoreEntry { player_id, score })
                .collect(),
            settings: game.settings.into(),
            next_round_at: game.next_round_at.map(format_system_time),
            created_at: format_system_time(game.created_at),
            updated_at: format_system_time(game.updated_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Outcome of a join request.
pub struct JoinResponse {
    /// `false` when the user already was a member.
    pub joined: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Outcome of claiming a pending deal.
pub struct ClaimResponse {
    pub claimed: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Outcome of a submission.
pub struct SubmitResponse {
    /// The submission completed the round, which is now being judged.
    pub all_submitted: bool,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            all_submitted: outcome.all_submitted,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Outcome of the judge's pick.
pub struct WinnerResponse {
    pub game_finished: bool,
    pub point_awarded: bool,
}

impl From<WinnerOutcome> for WinnerResponse {
    fn from(outcome: WinnerOutcome) -> Self {
        Self {
            game_finished: outcome.game_finished,
            point_awarded: outcome.point_awarded,
        }
    }
}

/// Outcome of advancing to the next round.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct AdvanceResponse {
    pub finished: bool,
    pub round_number: Option<u32>,
    pub judge_id: Option<String>,
}

impl From<AdvanceOutcome> for AdvanceResponse {
    fn from(outcome: AdvanceOutcome) -> Self {
        match outcome {
            AdvanceOutcome::Started {
                round_number,
                judge_id,
            } => Self {
                finished: false,
                round_number: Some(round_number),
                judge_id: Some(judge_id),
            },
            AdvanceOutcome::Finished => Self {
                finished: true,
                round_number: None,
                judge_id: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;
    use crate::dao::models::GameStatus;

    fn defaults() -> GameSettingsEntity {
        GameSettingsEntity {
            winning_score: 7,
            cards_per_hand: 7,
            deck_id: "default".into(),
            round_timeout_secs: 120,
        }
    }

    #[test]
    fn omitted_settings_use_defaults() {
        let request: CreateGameRequest =
            serde_json::from_str(r#"{ "winning_score": 3, "deck_id": "tech" }"#).unwrap();
        assert!(request.validate().is_ok());
        let settings = request.into_settings(&defaults());
        assert_eq!(settings.winning_score, 3);
        assert_eq!(settings.deck_id, "tech");
        assert_eq!(settings.cards_per_hand, 7);
        assert_eq!(settings.round_timeout_secs, 120);
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        let request = CreateGameRequest {
            winning_score: Some(0),
            ..Default::default()
        };
        assert!(request.validate().is_err());

        let request = CreateGameRequest {
            round_timeout_secs: Some(5),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn submit_requires_cards() {
        let request = SubmitCardsRequest {
            round: 1,
            card_ids: vec![],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn status_labels_follow_stored_names() {
        assert_eq!(status_label(&GameStatus::RoundEnd), "round_end");
        assert_eq!(status_label(&GameStatus::Waiting), "waiting");
    }
}
