/// Deck catalogue and resolution.
pub mod deck;
/// Per-user derived view of a game.
pub mod projection;
/// Pure game rules.
pub mod rules;
/// Game and round status tables.
pub mod state_machine;
/// Optimistic read/write set committed against the store.
pub mod transaction;
/// Atomic operations moving games between states.
pub mod transitions;
/// Live subscriptions to a game's documents.
pub mod view;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig, dao::game_store::GameStore, error::ServiceError,
    services::supervisor::SupervisorSlot, state::deck::DeckProvider,
};

pub type SharedState = Arc<AppState>;

/// Key of a running supervisor: one per connected (game, user).
pub type SupervisorKey = (Uuid, String);

/// Central application state storing the store handle, configuration and
/// the supervisors of connected clients.
pub struct AppState {
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    decks: Arc<DeckProvider>,
    supervisors: DashMap<SupervisorKey, SupervisorSlot>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, decks: DeckProvider) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            decks: Arc::new(decks),
            supervisors: DashMap::new(),
        })
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store, or [`ServiceError::Degraded`] while storage is down.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn decks(&self) -> &Arc<DeckProvider> {
        &self.decks
    }

    /// Registry of running supervisors.
    pub fn supervisors(&self) -> &DashMap<SupervisorKey, SupervisorSlot> {
        &self.supervisors
    }
}
