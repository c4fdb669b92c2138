use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{BlackCardEntity, WhiteCardEntity},
    dto::game::{ScoreEntry, status_label},
    state::projection::{ProjectedSubmission, Projection},
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlackCardView {
    pub id: String,
    pub text: String,
    pub pick: u32,
}

impl From<BlackCardEntity> for BlackCardView {
    fn from(card: BlackCardEntity) -> Self {
        Self {
            id: card.id,
            text: card.text,
            pick: card.pick,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WhiteCardView {
    pub id: String,
    pub text: String,
}

impl From<WhiteCardEntity> for WhiteCardView {
    fn from(card: WhiteCardEntity) -> Self {
        Self {
            id: card.id,
            text: card.text,
        }
    }
}

fn white_cards(cards: Vec<WhiteCardEntity>) -> Vec<WhiteCardView> {
    cards.into_iter().map(Into::into).collect()
}

/// A submission as seen by the receiving user.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmissionView {
    pub player_id: String,
    /// Absent while other players' answers are still hidden.
    pub cards: Option<Vec<WhiteCardView>>,
}

impl From<ProjectedSubmission> for SubmissionView {
    fn from(submission: ProjectedSubmission) -> Self {
        Self {
            player_id: submission.player_id,
            cards: submission.cards.map(white_cards),
        }
    }
}

/// Payload of the `projection` SSE event.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectionEvent {
    pub game_id: Uuid,
    pub user_id: String,
    /// Game status (`waiting`, `playing`, `judging`, `round_end`, `finished`).
    pub status: String,
    pub is_host: bool,
    pub is_judge: bool,
    pub is_player: bool,
    pub round_number: u32,
    pub round_status: Option<String>,
    pub judge_id: Option<String>,
    pub black_card: Option<BlackCardView>,
    /// In review order.
    pub submissions: Vec<SubmissionView>,
    pub expected_submissions: usize,
    pub has_submitted: bool,
    pub winner_id: Option<String>,
    pub winning_cards: Option<Vec<WhiteCardView>>,
    /// Highest score first.
    pub scores: Vec<ScoreEntry>,
    pub game_winner: Option<String>,
    /// Seconds before the current phase times out.
    pub seconds_left: Option<u64>,
    /// Seconds before the next round starts.
    pub next_round_in: Option<u64>,
    pub hand: Vec<WhiteCardView>,
    /// Dealt cards not yet moved into the hand.
    pub pending_cards: usize,
}

impl From<Projection> for ProjectionEvent {
    fn from(projection: Projection) -> Self {
        Self {
            game_id: projection.game_id,
            user_id: projection.user_id,
            status: status_label(&projection.status),
            is_host: projection.is_host,
            is_judge: projection.is_judge,
            is_player: projection.is_player,
            round_number: projection.round_number,
            round_status: projection.round_status.as_ref().map(status_label),
            judge_id: projection.judge_id,
            black_card: projection.black_card.map(Into::into),
            submissions: projection.submissions.into_iter().map(Into::into).collect(),
            expected_submissions: projection.expected_submissions,
            has_submitted: projection.has_submitted,
            winner_id: projection.winner_id,
            winning_cards: projection.winning_cards.map(white_cards),
            scores: projection
                .scores
                .into_iter()
                .map(|(player_id, score)| ScoreEntry { player_id, score })
                .collect(),
            game_winner: projection.standing_winner,
            seconds_left: projection.seconds_left,
            next_round_in: projection.next_round_in,
            hand: white_cards(projection.hand),
            pending_cards: projection.pending_cards,
        }
    }
}
