use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    game_store::{DocKey, DocWatch, Document, GameStore},
    models::{GameEntity, HandEntity, RoundEntity},
    storage::StorageResult,
};

/// Latest known documents one client cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSnapshot {
    pub game: Option<GameEntity>,
    pub round: Option<RoundEntity>,
    pub hand: Option<HandEntity>,
}

/// Live subscription to a game, its current round and one player's hand.
///
/// The round subscription follows `current_round` as the game advances.
pub struct GameWatch {
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    user: String,
    round_number: u32,
    game_rx: DocWatch,
    round_rx: DocWatch,
    hand_rx: DocWatch,
}

impl GameWatch {
    pub async fn open(store: Arc<dyn GameStore>, game_id: Uuid, user: &str) -> StorageResult<Self> {
        let game_rx = store.watch(DocKey::Game(game_id)).await?;
        let hand_rx = store.watch(DocKey::hand(game_id, user)).await?;
        let round_number = current_round(&game_rx, game_id);
        let round_rx = store.watch(DocKey::round(game_id, round_number)).await?;

        Ok(Self {
            store,
            game_id,
            user: user.to_owned(),
            round_number,
            game_rx,
            round_rx,
            hand_rx,
        })
    }

    pub fn game_id(&self) -> Uuid {
        self.game_id
    }

    /// Decode the current value of every watched document.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game: decode(&self.game_rx, DocKey::Game(self.game_id), Document::into_game),
            round: decode(
                &self.round_rx,
                DocKey::round(self.game_id, self.round_number),
                Document::into_round,
            ),
            hand: decode(&self.hand_rx, self.hand_key(), Document::into_hand),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn hand_key(&self) -> DocKey {
        DocKey::hand(self.game_id, self.user.as_str())
    }

    /// Re-subscribe the round watch when the game moved to another round.
    async fn follow_round(&mut self) -> StorageResult<()> {
        let latest = current_round(&self.game_rx, self.game_id);
        if latest != self.round_number {
            self.round_rx = self
                .store
                .watch(DocKey::round(self.game_id, latest))
                .await?;
            self.round_number = latest;
        }
        Ok(())
    }

    /// Wait for the next change of any watched document. Returns `false` once
    /// the store stops publishing.
    ///
    /// Cancel safe: a round switch interrupted mid-way is completed by the
    /// next call.
    pub async fn changed(&mut self) -> StorageResult<bool> {
        self.follow_round().await?;
        let alive = tokio::select! {
            res = self.game_rx.changed() => res.is_ok(),
            res = self.round_rx.changed() => res.is_ok(),
            res = self.hand_rx.changed() => res.is_ok(),
        };
        if !alive {
            return Ok(false);
        }
        self.follow_round().await?;
        Ok(true)
    }
}

fn current_round(game_rx: &DocWatch, game_id: Uuid) -> u32 {
    decode(game_rx, DocKey::Game(game_id), Document::into_game)
        .map_or(0, |game| game.current_round)
}

fn decode<T>(
    rx: &DocWatch,
    key: DocKey,
    convert: fn(Document, &DocKey) -> StorageResult<T>,
) -> Option<T> {
    let value = rx.borrow().as_ref().map(|versioned| versioned.value.clone())?;
    match convert(value, &key) {
        Ok(entity) => Some(entity),
        Err(err) => {
            warn!(key = %key, error = %err, "ignoring undecodable document");
            None
        }
    }
}
