use axum::Router;

use crate::state::SharedState;

pub mod decks;
pub mod docs;
pub mod game;
pub mod health;
pub mod sse;
pub mod user;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(decks::router())
        .merge(game::router())
        .merge(docs::router())
        .with_state(state)
}
