//! In-process document store with the same optimistic-commit contract as the
//! MongoDB backend. Used by tests and by the `STORE=memory` mode.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, watch};
use tracing::debug;
use uuid::Uuid;

use super::{Commit, DocKey, DocWatch, Document, GameStore, Versioned};
use crate::dao::{
    models::GameEntity,
    storage::{StorageError, StorageResult},
};

#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<DocKey, Versioned<Document>>,
    watchers: HashMap<DocKey, watch::Sender<Option<Versioned<Document>>>>,
    last_revision: u64,
}

impl MemoryState {
    fn publish(&mut self, key: &DocKey) {
        let current = self.documents.get(key).cloned();
        let drop_sender = match self.watchers.get(key) {
            Some(sender) => {
                sender.send_replace(current);
                sender.receiver_count() == 0
            }
            None => false,
        };
        if drop_sender {
            self.watchers.remove(key);
        }
    }
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameStore for MemoryGameStore {
    fn read(&self, key: DocKey) -> BoxFuture<'static, StorageResult<Option<Versioned<Document>>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.lock().await;
            Ok(guard.documents.get(&key).cloned())
        })
    }

    fn commit(&self, commit: Commit) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.lock().await;

            for stamp in &commit.reads {
                let current = guard.documents.get(&stamp.key).map(|doc| doc.revision);
                if current != stamp.revision {
                    debug!(
                        key = %stamp.key,
                        expected = ?stamp.revision,
                        actual = ?current,
                        "memory store rejected stale transaction"
                    );
                    return Err(StorageError::conflict(&stamp.key));
                }
            }

            for write in commit.writes {
                match write.document {
                    Some(value) => {
                        guard.last_revision += 1;
                        let revision = guard.last_revision;
                        guard
                            .documents
                            .insert(write.key.clone(), Versioned { revision, value });
                    }
                    None => {
                        guard.documents.remove(&write.key);
                    }
                }
                guard.publish(&write.key);
            }

            Ok(())
        })
    }

    fn watch(&self, key: DocKey) -> BoxFuture<'static, StorageResult<DocWatch>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.lock().await;
            let current = guard.documents.get(&key).cloned();
            let sender = guard
                .watchers
                .entry(key)
                .or_insert_with(|| watch::channel(current).0);
            Ok(sender.subscribe())
        })
    }

    fn list_games(&self) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.lock().await;
            Ok(guard
                .documents
                .values()
                .filter_map(|doc| match &doc.value {
                    Document::Game(game) => Some(game.clone()),
                    _ => None,
                })
                .collect())
        })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.lock().await;
            let existed = guard.documents.contains_key(&DocKey::Game(id));
            let doomed: Vec<DocKey> = guard
                .documents
                .keys()
                .filter(|key| key.game_id() == Some(id))
                .cloned()
                .collect();
            for key in doomed {
                guard.documents.remove(&key);
                guard.publish(&key);
            }
            Ok(existed)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
