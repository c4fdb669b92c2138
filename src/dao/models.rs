use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Lobby: players may join, the host may kick.
    Waiting,
    /// A round is collecting submissions.
    Playing,
    /// The judge is choosing a winner.
    Judging,
    /// Pause between rounds while the advance countdown runs.
    RoundEnd,
    /// Match over; terminal.
    Finished,
}

/// Lifecycle status of a single round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Collecting answers from non-judge players.
    Submitting,
    /// Judge deciding.
    Judging,
    /// Winner recorded; immutable from here on.
    Complete,
}

/// Settings fixed at game creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSettingsEntity {
    /// Score that ends the match.
    pub winning_score: u32,
    /// Number of white cards each hand is topped up to.
    pub cards_per_hand: usize,
    /// Deck identifier resolved by the deck provider.
    pub deck_id: String,
    /// Submission phase timeout, in seconds.
    pub round_timeout_secs: u64,
}

/// Remaining shuffled card pools, consumed as rounds progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeckPoolEntity {
    pub black_card_ids: Vec<String>,
    pub white_card_ids: Vec<String>,
}

/// Aggregate game document shared by every client of a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Primary key of the game.
    pub id: Uuid,
    /// Player holding host authority.
    pub host_id: String,
    /// Ordered roster; the order drives judge rotation.
    pub player_uids: Vec<String>,
    pub status: GameStatus,
    /// Number of the active round (`round_<n>`), 0 before the start.
    pub current_round: u32,
    /// Index into `player_uids` of the current judge.
    pub current_judge_index: usize,
    pub settings: GameSettingsEntity,
    /// Scores keyed by player, in join order.
    pub scores: IndexMap<String, u32>,
    pub deck: DeckPoolEntity,
    /// Cards dealt but not yet claimed into the owner's hand.
    #[serde(default)]
    pub pending_deals: IndexMap<String, Vec<String>>,
    /// When set, the automatic round advance is due at this instant.
    #[serde(default)]
    pub next_round_at: Option<SystemTime>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the game document was updated.
    pub updated_at: SystemTime,
}

/// Prompt card with its blank count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlackCardEntity {
    pub id: String,
    pub text: String,
    pub pick: u32,
}

/// Answer card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WhiteCardEntity {
    pub id: String,
    pub text: String,
}

/// Cards a player submitted for a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionEntity {
    pub cards: Vec<WhiteCardEntity>,
    pub submitted_at: SystemTime,
}

/// One round of a game, stored as `round_<n>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    pub round_number: u32,
    pub judge_id: String,
    pub black_card: BlackCardEntity,
    pub submissions: IndexMap<String, SubmissionEntity>,
    pub winner_id: Option<String>,
    pub winning_cards: Option<Vec<WhiteCardEntity>>,
    pub status: RoundStatus,
    pub started_at: SystemTime,
    /// Set when the round enters judging; the judging deadline runs from here.
    #[serde(default)]
    pub judging_started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
}

/// A player's unplayed white cards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandEntity {
    pub cards: Vec<WhiteCardEntity>,
    pub last_updated: SystemTime,
}

impl HandEntity {
    /// Fresh empty hand.
    pub fn empty(at: SystemTime) -> Self {
        Self {
            cards: Vec::new(),
            last_updated: at,
        }
    }
}

/// User-authored deck stored next to the games.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomDeckEntity {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub black_cards: Vec<RawBlackCard>,
    pub white_cards: Vec<RawWhiteCard>,
}

/// Black card as authored, before ids are assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawBlackCard {
    pub text: String,
    #[serde(default = "default_pick")]
    pub pick: u32,
}

/// White card as authored: either a bare string or an object with `text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawWhiteCard {
    Text(String),
    Object { text: String },
}

impl RawWhiteCard {
    /// Card text regardless of the authored shape.
    pub fn into_text(self) -> String {
        match self {
            RawWhiteCard::Text(text) | RawWhiteCard::Object { text } => text,
        }
    }
}

fn default_pick() -> u32 {
    1
}
