//! Deck provider: resolves a deck id to concrete black and white cards.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::dao::{
    game_store::{DocKey, GameStore},
    models::{BlackCardEntity, CustomDeckEntity, WhiteCardEntity},
};

/// Identifier of the deck used when nothing else resolves.
pub const DEFAULT_DECK_ID: &str = "default";

const BUILTIN_SOURCES: [(&str, &str); 2] = [
    (DEFAULT_DECK_ID, include_str!("../../decks/default.json")),
    ("tech", include_str!("../../decks/tech.json")),
];

/// Failure to parse one of the decks embedded in the binary.
#[derive(Debug, Error)]
#[error("embedded deck `{deck_id}` is malformed")]
pub struct DeckLoadError {
    deck_id: &'static str,
    #[source]
    source: serde_json::Error,
}

/// Fully resolved deck, indexed by card id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub id: String,
    pub black_cards: IndexMap<String, BlackCardEntity>,
    pub white_cards: IndexMap<String, WhiteCardEntity>,
}

impl Deck {
    /// Assign deterministic ids (`b-<deck>-<i>`, `w-<deck>-<i>`) to authored cards.
    pub fn from_source(id: &str, source: CustomDeckEntity) -> Self {
        let black_cards = source
            .black_cards
            .into_iter()
            .enumerate()
            .map(|(index, card)| {
                let card_id = format!("b-{id}-{index}");
                let card = BlackCardEntity {
                    id: card_id.clone(),
                    text: card.text,
                    pick: card.pick.max(1),
                };
                (card_id, card)
            })
            .collect();
        let white_cards = source
            .white_cards
            .into_iter()
            .enumerate()
            .map(|(index, card)| {
                let card_id = format!("w-{id}-{index}");
                let card = WhiteCardEntity {
                    id: card_id.clone(),
                    text: card.into_text(),
                };
                (card_id, card)
            })
            .collect();

        Self {
            id: id.to_owned(),
            black_cards,
            white_cards,
        }
    }

    pub fn black_card(&self, id: &str) -> Option<&BlackCardEntity> {
        self.black_cards.get(id)
    }

    pub fn white_card(&self, id: &str) -> Option<&WhiteCardEntity> {
        self.white_cards.get(id)
    }
}

/// Catalog entry describing a selectable deck.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct DeckMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub card_count: usize,
}

struct BuiltinDeck {
    metadata: DeckMetadata,
    deck: Arc<Deck>,
}

/// Resolves deck ids to card sets: built-in decks first, then user-authored
/// decks from the store, falling back to the default deck.
pub struct DeckProvider {
    builtin: IndexMap<&'static str, BuiltinDeck>,
}

impl DeckProvider {
    /// Parse the decks bundled with the binary.
    pub fn load() -> Result<Self, DeckLoadError> {
        let mut builtin = IndexMap::new();
        for (deck_id, raw) in BUILTIN_SOURCES {
            let source: CustomDeckEntity = serde_json::from_str(raw)
                .map_err(|source| DeckLoadError { deck_id, source })?;
            let metadata = DeckMetadata {
                id: deck_id.to_owned(),
                name: source.name.clone(),
                description: source.description.clone(),
                card_count: source.black_cards.len() + source.white_cards.len(),
            };
            let deck = Arc::new(Deck::from_source(deck_id, source));
            builtin.insert(deck_id, BuiltinDeck { metadata, deck });
        }
        Ok(Self { builtin })
    }

    /// Built-in decks available to every game.
    pub fn catalog(&self) -> Vec<DeckMetadata> {
        self.builtin
            .values()
            .map(|entry| entry.metadata.clone())
            .collect()
    }

    /// Built-in deck by id, without consulting the store.
    pub fn builtin(&self, deck_id: &str) -> Option<Arc<Deck>> {
        self.builtin.get(deck_id).map(|entry| entry.deck.clone())
    }

    fn fallback(&self, deck_id: &str) -> Arc<Deck> {
        match self.builtin.get(DEFAULT_DECK_ID) {
            Some(entry) => entry.deck.clone(),
            None => Arc::new(Deck {
                id: deck_id.to_owned(),
                black_cards: IndexMap::new(),
                white_cards: IndexMap::new(),
            }),
        }
    }

    /// Resolve `deck_id`. Never fails: unknown or unreadable decks fall back
    /// to the default deck.
    pub async fn resolve(&self, store: &dyn GameStore, deck_id: &str) -> Arc<Deck> {
        if let Some(deck) = self.builtin(deck_id) {
            return deck;
        }

        let key = DocKey::Deck(deck_id.to_owned());
        match store.read(key.clone()).await {
            Ok(Some(versioned)) => match versioned.value.into_deck(&key) {
                Ok(source) => {
                    debug!(deck_id, "resolved user-authored deck");
                    Arc::new(Deck::from_source(deck_id, source))
                }
                Err(err) => {
                    warn!(deck_id, error = %err, "custom deck unreadable; falling back to default");
                    self.fallback(deck_id)
                }
            },
            Ok(None) => {
                warn!(deck_id, "deck not found; falling back to default");
                self.fallback(deck_id)
            }
            Err(err) => {
                warn!(deck_id, error = %err, "failed to load custom deck; falling back to default");
                self.fallback(deck_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{
        game_store::{Commit, Document, MemoryGameStore, Write},
        models::{RawBlackCard, RawWhiteCard},
    };

    #[test]
    fn builtin_decks_parse_with_deterministic_ids() {
        let provider = DeckProvider::load().unwrap();
        let catalog = provider.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].id, "default");

        let deck = provider.builtin("tech").unwrap();
        assert!(deck.black_card("b-tech-0").is_some());
        assert!(deck.white_card("w-tech-0").is_some());
        assert!(deck.black_cards.values().all(|card| card.pick >= 1));
        assert!(deck.white_cards.values().all(|card| !card.text.is_empty()));
    }

    #[tokio::test]
    async fn custom_deck_normalizes_white_card_shapes() {
        let provider = DeckProvider::load().unwrap();
        let store = MemoryGameStore::new();
        let custom = CustomDeckEntity {
            name: "Office".into(),
            description: String::new(),
            black_cards: vec![RawBlackCard {
                text: "Who took my _____?".into(),
                pick: 1,
            }],
            white_cards: vec![
                RawWhiteCard::Text("Stapler".into()),
                RawWhiteCard::Object {
                    text: "Lunch".into(),
                },
            ],
        };
        store
            .commit(Commit {
                reads: vec![],
                writes: vec![Write {
                    key: DocKey::Deck("office".into()),
                    document: Some(Document::Deck(custom)),
                }],
            })
            .await
            .unwrap();

        let deck = provider.resolve(&store, "office").await;
        assert_eq!(deck.id, "office");
        assert_eq!(deck.white_card("w-office-1").unwrap().text, "Lunch");
        assert_eq!(deck.black_card("b-office-0").unwrap().pick, 1);
    }

    #[test]
    fn white_cards_accept_strings_and_objects() {
        let cards: Vec<RawWhiteCard> =
            serde_json::from_str(r#"["plain", {"text": "wrapped"}]"#).unwrap();
        let texts: Vec<String> = cards.into_iter().map(RawWhiteCard::into_text).collect();
        assert_eq!(texts, vec!["plain", "wrapped"]);
    }

    #[tokio::test]
    async fn unknown_deck_falls_back_to_default() {
        let provider = DeckProvider::load().unwrap();
        let store = MemoryGameStore::new();
        let deck = provider.resolve(&store, "missing").await;
        assert_eq!(deck.id, DEFAULT_DECK_ID);
        assert!(!deck.black_cards.is_empty());
    }
}
