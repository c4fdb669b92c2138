pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::dao::models::{CustomDeckEntity, GameEntity, HandEntity, RoundEntity};
use crate::dao::storage::{StorageError, StorageResult};

pub use self::memory::MemoryGameStore;

/// Address of a single document in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocKey {
    Game(Uuid),
    Round { game_id: Uuid, number: u32 },
    Hand { game_id: Uuid, player_id: String },
    Deck(String),
}

impl DocKey {
    pub fn round(game_id: Uuid, number: u32) -> Self {
        DocKey::Round { game_id, number }
    }

    pub fn hand(game_id: Uuid, player_id: impl Into<String>) -> Self {
        DocKey::Hand {
            game_id,
            player_id: player_id.into(),
        }
    }

    /// Game this document belongs to, if any.
    pub fn game_id(&self) -> Option<Uuid> {
        match self {
            DocKey::Game(id) => Some(*id),
            DocKey::Round { game_id, .. } | DocKey::Hand { game_id, .. } => Some(*game_id),
            DocKey::Deck(_) => None,
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocKey::Game(id) => write!(f, "games/{id}"),
            DocKey::Round { game_id, number } => write!(f, "games/{game_id}/round_{number}"),
            DocKey::Hand { game_id, player_id } => write!(f, "games/{game_id}/hand_{player_id}"),
            DocKey::Deck(id) => write!(f, "decks/{id}"),
        }
    }
}

/// Any document the engine persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Document {
    Game(GameEntity),
    Round(RoundEntity),
    Hand(HandEntity),
    Deck(CustomDeckEntity),
}

impl Document {
    fn kind(&self) -> &'static str {
        match self {
            Document::Game(_) => "game",
            Document::Round(_) => "round",
            Document::Hand(_) => "hand",
            Document::Deck(_) => "deck",
        }
    }

    pub fn into_game(self, key: &DocKey) -> StorageResult<GameEntity> {
        match self {
            Document::Game(game) => Ok(game),
            other => Err(kind_mismatch(key, "game", &other)),
        }
    }

    pub fn into_round(self, key: &DocKey) -> StorageResult<RoundEntity> {
        match self {
            Document::Round(round) => Ok(round),
            other => Err(kind_mismatch(key, "round", &other)),
        }
    }

    pub fn into_hand(self, key: &DocKey) -> StorageResult<HandEntity> {
        match self {
            Document::Hand(hand) => Ok(hand),
            other => Err(kind_mismatch(key, "hand", &other)),
        }
    }

    pub fn into_deck(self, key: &DocKey) -> StorageResult<CustomDeckEntity> {
        match self {
            Document::Deck(deck) => Ok(deck),
            other => Err(kind_mismatch(key, "deck", &other)),
        }
    }
}

fn kind_mismatch(key: &DocKey, expected: &str, found: &Document) -> StorageError {
    StorageError::Corrupt {
        key: key.to_string(),
        reason: format!("expected a {expected} document, found {}", found.kind()),
    }
}

/// A document together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub revision: u64,
    pub value: T,
}

/// Revision observed for a key inside a transaction (`None` when absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStamp {
    pub key: DocKey,
    pub revision: Option<u64>,
}

/// Pending mutation of one document; `None` deletes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub key: DocKey,
    pub document: Option<Document>,
}

/// Everything a transaction wants to apply atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    pub reads: Vec<ReadStamp>,
    pub writes: Vec<Write>,
}

/// Live view of one document, replaying the last known value on subscribe.
pub type DocWatch = watch::Receiver<Option<Versioned<Document>>>;

/// Abstraction over the shared document store every client writes to.
///
/// `commit` must apply all writes or none, and only when every read stamp
/// still matches the stored revision; otherwise it returns
/// [`StorageError::Conflict`].
pub trait GameStore: Send + Sync {
    fn read(&self, key: DocKey) -> BoxFuture<'static, StorageResult<Option<Versioned<Document>>>>;
    fn commit(&self, commit: Commit) -> BoxFuture<'static, StorageResult<()>>;
    fn watch(&self, key: DocKey) -> BoxFuture<'static, StorageResult<DocWatch>>;
    fn list_games(&self) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>>;
    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
