use std::{collections::HashMap, sync::Arc, time::SystemTime};

use indexmap::IndexMap;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        game_store::{Commit, DocKey, Document, GameStore, ReadStamp, Write},
        models::{GameEntity, HandEntity, RoundEntity},
    },
    state::transitions::{IntegrityError, TransitionError, TransitionResult},
};

/// Read-modify-write unit of work against the shared store.
///
/// Every document read is stamped with the revision it was observed at. On
/// [`Transaction::commit`] the store applies the buffered writes only if none
/// of those revisions moved, so the whole operation either lands or is
/// rejected with [`TransitionError::Conflict`].
pub struct Transaction {
    store: Arc<dyn GameStore>,
    now: SystemTime,
    stamps: IndexMap<DocKey, Option<u64>>,
    snapshot: HashMap<DocKey, Option<Document>>,
    writes: IndexMap<DocKey, Option<Document>>,
}

impl Transaction {
    pub fn begin(store: Arc<dyn GameStore>) -> Self {
        Self::begin_at(store, SystemTime::now())
    }

    /// Start a transaction whose timestamps all use `now`.
    pub fn begin_at(store: Arc<dyn GameStore>, now: SystemTime) -> Self {
        Self {
            store,
            now,
            stamps: IndexMap::new(),
            snapshot: HashMap::new(),
            writes: IndexMap::new(),
        }
    }

    /// Timestamp assigned to everything written by this transaction.
    pub fn now(&self) -> SystemTime {
        self.now
    }

    async fn load(&mut self, key: &DocKey) -> TransitionResult<Option<Document>> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        if let Some(seen) = self.snapshot.get(key) {
            return Ok(seen.clone());
        }

        let current = self.store.read(key.clone()).await?;
        let (revision, value) = match current {
            Some(versioned) => (Some(versioned.revision), Some(versioned.value)),
            None => (None, None),
        };
        self.stamps.insert(key.clone(), revision);
        self.snapshot.insert(key.clone(), value.clone());
        Ok(value)
    }

    pub async fn find_game(&mut self, id: Uuid) -> TransitionResult<Option<GameEntity>> {
        let key = DocKey::Game(id);
        match self.load(&key).await? {
            Some(document) => Ok(Some(document.into_game(&key)?)),
            None => Ok(None),
        }
    }

    pub async fn game(&mut self, id: Uuid) -> TransitionResult<GameEntity> {
        self.find_game(id)
            .await?
            .ok_or_else(|| missing(DocKey::Game(id)))
    }

    pub async fn find_round(
        &mut self,
        game_id: Uuid,
        number: u32,
    ) -> TransitionResult<Option<RoundEntity>> {
        let key = DocKey::round(game_id, number);
        match self.load(&key).await? {
            Some(document) => Ok(Some(document.into_round(&key)?)),
            None => Ok(None),
        }
    }

    pub async fn round(&mut self, game_id: Uuid, number: u32) -> TransitionResult<RoundEntity> {
        self.find_round(game_id, number)
            .await?
            .ok_or_else(|| missing(DocKey::round(game_id, number)))
    }

    pub async fn find_hand(
        &mut self,
        game_id: Uuid,
        player_id: &str,
    ) -> TransitionResult<Option<HandEntity>> {
        let key = DocKey::hand(game_id, player_id);
        match self.load(&key).await? {
            Some(document) => Ok(Some(document.into_hand(&key)?)),
            None => Ok(None),
        }
    }

    pub async fn hand(&mut self, game_id: Uuid, player_id: &str) -> TransitionResult<HandEntity> {
        self.find_hand(game_id, player_id)
            .await?
            .ok_or_else(|| missing(DocKey::hand(game_id, player_id)))
    }

    pub fn put_game(&mut self, game: GameEntity) {
        self.writes
            .insert(DocKey::Game(game.id), Some(Document::Game(game)));
    }

    pub fn put_round(&mut self, game_id: Uuid, round: RoundEntity) {
        self.writes.insert(
            DocKey::round(game_id, round.round_number),
            Some(Document::Round(round)),
        );
    }

    pub fn put_hand(&mut self, game_id: Uuid, player_id: &str, hand: HandEntity) {
        self.writes
            .insert(DocKey::hand(game_id, player_id), Some(Document::Hand(hand)));
    }

    pub fn delete(&mut self, key: DocKey) {
        self.writes.insert(key, None);
    }

    /// Apply all buffered writes atomically. A transaction that wrote nothing
    /// commits trivially.
    pub async fn commit(self) -> TransitionResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let commit = Commit {
            reads: self
                .stamps
                .into_iter()
                .map(|(key, revision)| ReadStamp { key, revision })
                .collect(),
            writes: self
                .writes
                .into_iter()
                .map(|(key, document)| Write { key, document })
                .collect(),
        };
        let write_count = commit.writes.len();

        self.store.commit(commit).await?;
        debug!(writes = write_count, "transaction committed");
        Ok(())
    }
}

fn missing(key: DocKey) -> TransitionError {
    TransitionError::Integrity(IntegrityError::MissingDocument {
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::game_store::MemoryGameStore;

    #[tokio::test]
    async fn concurrent_transactions_cannot_both_commit() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
        let game_id = Uuid::new_v4();

        let mut first = Transaction::begin(store.clone());
        let mut second = Transaction::begin(store.clone());
        assert!(first.find_hand(game_id, "a").await.unwrap().is_none());
        assert!(second.find_hand(game_id, "a").await.unwrap().is_none());

        first.put_hand(game_id, "a", HandEntity::empty(first.now()));
        second.put_hand(game_id, "a", HandEntity::empty(second.now()));

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, TransitionError::Conflict));
    }

    #[tokio::test]
    async fn reads_see_own_pending_writes() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
        let game_id = Uuid::new_v4();
        let mut tx = Transaction::begin(store);

        let err = tx.hand(game_id, "a").await.unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Integrity(IntegrityError::MissingDocument { .. })
        ));

        tx.put_hand(game_id, "a", HandEntity::empty(tx.now()));
        assert!(tx.hand(game_id, "a").await.is_ok());
    }
}
