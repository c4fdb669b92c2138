use axum::{Json, Router, extract::State, routing::get};

use crate::{services::game_service, state::SharedState, state::deck::DeckMetadata};

/// List the decks bundled with the server.
#[utoipa::path(
    get,
    path = "/decks",
    tag = "decks",
    responses((status = 200, description = "Built-in decks", body = [DeckMetadata]))
)]
pub async fn list_decks(State(state): State<SharedState>) -> Json<Vec<DeckMetadata>> {
    Json(game_service::list_decks(&state))
}

pub fn router() -> Router<SharedState> {
    Router::new().route("/decks", get(list_decks))
}
