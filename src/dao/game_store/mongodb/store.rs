use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database,
    bson::doc,
    change_stream::event::OperationType,
    options::{FullDocumentType, IndexOptions},
};
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_write_conflict},
    models::MongoEnvelope,
};
use crate::dao::{
    game_store::{Commit, DocKey, DocWatch, Document, GameStore, Versioned, Write},
    models::GameEntity,
    storage::{StorageError, StorageResult},
};

const DOCUMENT_COLLECTION_NAME: &str = "documents";

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"game_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("document_game_idx".to_owned()))
                    .sparse(Some(true))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: DOCUMENT_COLLECTION_NAME,
                index: "game_id",
                source,
            })?;

        Ok(())
    }

    async fn client(&self) -> Client {
        let guard = self.inner.state.read().await;
        guard.client.clone()
    }

    async fn collection(&self) -> Collection<MongoEnvelope> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoEnvelope>(DOCUMENT_COLLECTION_NAME)
    }

    async fn read(&self, key: DocKey) -> MongoResult<Option<Versioned<Document>>> {
        let collection = self.collection().await;
        let id = key.to_string();
        let envelope = collection
            .find_one(doc! {"_id": &id})
            .await
            .map_err(|source| MongoDaoError::ReadDocument { key: id, source })?;
        Ok(envelope.map(MongoEnvelope::into_versioned))
    }

    async fn commit(&self, commit: Commit) -> StorageResult<()> {
        let client = self.client().await;
        let collection = self.collection().await;
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction { source })?;

        match apply_commit(&collection, &mut session, commit).await {
            Ok(()) => match session.commit_transaction().await {
                Ok(()) => Ok(()),
                Err(err) if is_write_conflict(&err) => {
                    Err(StorageError::conflict("transaction commit"))
                }
                Err(source) => Err(MongoDaoError::Transaction { source }.into()),
            },
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(error = %abort_err, "failed to abort MongoDB transaction");
                }
                Err(err)
            }
        }
    }

    async fn watch(&self, key: DocKey) -> MongoResult<DocWatch> {
        let collection = self.collection().await;
        let id = key.to_string();

        // Open the stream before the initial read so no change falls in between.
        let mut stream = collection
            .watch()
            .pipeline([doc! {"$match": {"documentKey._id": &id}}])
            .full_document(FullDocumentType::UpdateLookup)
            .await
            .map_err(|source| MongoDaoError::Watch {
                key: id.clone(),
                source,
            })?;

        let current = collection
            .find_one(doc! {"_id": &id})
            .await
            .map_err(|source| MongoDaoError::ReadDocument {
                key: id.clone(),
                source,
            })?;
        let (tx, rx) = watch::channel(current.map(MongoEnvelope::into_versioned));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = stream.try_next() => match next {
                        Ok(Some(event)) => {
                            let value = match event.operation_type {
                                OperationType::Delete => None,
                                _ => event.full_document.map(MongoEnvelope::into_versioned),
                            };
                            tx.send_replace(value);
                        }
                        Ok(None) => break,
                        Err(err) => {
                            warn!(key = %id, error = %err, "change stream interrupted");
                            break;
                        }
                    },
                }
            }
            debug!(key = %id, "change stream closed");
        });

        Ok(rx)
    }

    async fn list_games(&self) -> MongoResult<Vec<GameEntity>> {
        let collection = self.collection().await;

        let documents: Vec<MongoEnvelope> = collection
            .find(doc! {"document.kind": "game"})
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?;

        Ok(documents
            .into_iter()
            .filter_map(|envelope| match envelope.document {
                Document::Game(game) => Some(game),
                _ => None,
            })
            .collect())
    }

    async fn delete_game(&self, id: Uuid) -> MongoResult<bool> {
        let collection = self.collection().await;
        let existed = collection
            .find_one(doc! {"_id": DocKey::Game(id).to_string()})
            .await
            .map_err(|source| MongoDaoError::DeleteGame { id, source })?
            .is_some();
        collection
            .delete_many(doc! {"game_id": id.to_string()})
            .await
            .map_err(|source| MongoDaoError::DeleteGame { id, source })?;
        Ok(existed)
    }
}

/// Verify every read stamp and apply every write inside the open transaction.
async fn apply_commit(
    collection: &Collection<MongoEnvelope>,
    session: &mut ClientSession,
    commit: Commit,
) -> StorageResult<()> {
    let now = SystemTime::now();
    let stamps: HashMap<&DocKey, Option<u64>> = commit
        .reads
        .iter()
        .map(|stamp| (&stamp.key, stamp.revision))
        .collect();
    let written: Vec<&DocKey> = commit.writes.iter().map(|write| &write.key).collect();

    for stamp in &commit.reads {
        if written.contains(&&stamp.key) {
            continue;
        }
        let current = current_revision(collection, session, &stamp.key).await?;
        if current != stamp.revision {
            return Err(StorageError::conflict(&stamp.key));
        }
    }

    for Write { key, document } in &commit.writes {
        let expected = match stamps.get(key) {
            Some(revision) => *revision,
            None => current_revision(collection, session, key).await?,
        };
        let id = key.to_string();
        let outcome = match (document, expected) {
            (Some(document), None) => {
                let envelope = MongoEnvelope::new(key, 1, document.clone(), now);
                collection
                    .insert_one(&envelope)
                    .session(&mut *session)
                    .await
                    .map(|_| true)
            }
            (Some(document), Some(revision)) => {
                let envelope = MongoEnvelope::new(key, revision + 1, document.clone(), now);
                collection
                    .replace_one(doc! {"_id": &id, "revision": revision as i64}, &envelope)
                    .session(&mut *session)
                    .await
                    .map(|result| result.matched_count == 1)
            }
            (None, Some(revision)) => collection
                .delete_one(doc! {"_id": &id, "revision": revision as i64})
                .session(&mut *session)
                .await
                .map(|result| result.deleted_count == 1),
            (None, None) => Ok(true),
        };

        match outcome {
            Ok(true) => {}
            Ok(false) => return Err(StorageError::conflict(key)),
            Err(err) if is_write_conflict(&err) => return Err(StorageError::conflict(key)),
            Err(source) => return Err(MongoDaoError::WriteDocument { key: id, source }.into()),
        }
    }

    Ok(())
}

async fn current_revision(
    collection: &Collection<MongoEnvelope>,
    session: &mut ClientSession,
    key: &DocKey,
) -> StorageResult<Option<u64>> {
    let id = key.to_string();
    match collection
        .find_one(doc! {"_id": &id})
        .session(&mut *session)
        .await
    {
        Ok(envelope) => Ok(envelope.map(|envelope| envelope.revision())),
        Err(err) if is_write_conflict(&err) => Err(StorageError::conflict(key)),
        Err(source) => Err(MongoDaoError::ReadDocument { key: id, source }.into()),
    }
}

impl GameStore for MongoGameStore {
    fn read(&self, key: DocKey) -> BoxFuture<'static, StorageResult<Option<Versioned<Document>>>> {
        let store = self.clone();
        Box::pin(async move { store.read(key).await.map_err(Into::into) })
    }

    fn commit(&self, commit: Commit) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.commit(commit).await })
    }

    fn watch(&self, key: DocKey) -> BoxFuture<'static, StorageResult<DocWatch>> {
        let store = self.clone();
        Box::pin(async move { store.watch(key).await.map_err(Into::into) })
    }

    fn list_games(&self) -> BoxFuture<'static, StorageResult<Vec<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_games().await.map_err(Into::into) })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_game(id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
