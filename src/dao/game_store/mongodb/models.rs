use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::dao::game_store::{DocKey, Document, Versioned};

/// Stored form of every document: one collection, keyed by the document path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEnvelope {
    #[serde(rename = "_id")]
    pub key: String,
    pub revision: i64,
    /// Owning game, used for cascading deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    pub written_at: DateTime,
    pub document: Document,
}

impl MongoEnvelope {
    pub fn new(key: &DocKey, revision: u64, document: Document, at: SystemTime) -> Self {
        Self {
            key: key.to_string(),
            revision: revision as i64,
            game_id: key.game_id().map(|id| id.to_string()),
            written_at: DateTime::from_system_time(at),
            document,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision.max(0) as u64
    }

    pub fn into_versioned(self) -> Versioned<Document> {
        Versioned {
            revision: self.revision(),
            value: self.document,
        }
    }
}
