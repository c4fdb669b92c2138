use std::time::{Duration, SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageResult},
    state::SharedState,
};

/// Delete games, with their rounds and hands, untouched since before
/// `now - retention`. Returns how many games were removed.
pub async fn purge_stale(
    store: &dyn GameStore,
    now: SystemTime,
    retention: Duration,
) -> StorageResult<usize> {
    let Some(cutoff) = now.checked_sub(retention) else {
        return Ok(0);
    };

    let mut removed = 0;
    for game in store.list_games().await? {
        if game.updated_at >= cutoff {
            continue;
        }
        if store.delete_game(game.id).await? {
            debug!(game_id = %game.id, "stale game deleted");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Periodically purge stale games while storage is available.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().cleanup_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(store) = state.game_store().await else {
            debug!("storage unavailable; skipping cleanup");
            continue;
        };

        match purge_stale(store.as_ref(), SystemTime::now(), state.config().retention).await {
            Ok(0) => debug!("no stale games"),
            Ok(removed) => info!(removed, "stale games deleted"),
            Err(err) => warn!(error = %err, "stale game cleanup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dao::game_store::{Commit, DocKey, Document, MemoryGameStore, ReadStamp, Write},
        state::transitions::{create_game, fixtures},
    };

    const DAY: Duration = Duration::from_secs(24 * 3_600);

    async fn age(store: &Arc<dyn GameStore>, id: uuid::Uuid, by: Duration) {
        let key = DocKey::Game(id);
        let versioned = store.read(key.clone()).await.unwrap().unwrap();
        let mut game = versioned.value.into_game(&key).unwrap();
        game.updated_at -= by;
        store
            .commit(Commit {
                reads: vec![ReadStamp {
                    key: key.clone(),
                    revision: Some(versioned.revision),
                }],
                writes: vec![Write {
                    key,
                    document: Some(Document::Game(game)),
                }],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn only_games_past_retention_are_removed() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
        let deck = fixtures::deck();
        let old = fixtures::started_game(&store, &deck, 3).await;
        let fresh = create_game(store.clone(), "z", fixtures::settings(3))
            .await
            .unwrap();
        age(&store, old, 2 * DAY).await;

        let removed = purge_stale(store.as_ref(), SystemTime::now(), DAY)
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.read(DocKey::Game(old)).await.unwrap().is_none());
        assert!(store.read(DocKey::round(old, 1)).await.unwrap().is_none());
        assert!(store.read(DocKey::hand(old, "a")).await.unwrap().is_none());
        assert!(store.read(DocKey::Game(fresh.id)).await.unwrap().is_some());
    }
}
