use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the party cards backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::decks::list_decks,
        crate::routes::sse::game_events,
        crate::routes::game::list_games,
        crate::routes::game::create_game,
        crate::routes::game::get_game,
        crate::routes::game::join_game,
        crate::routes::game::leave_game,
        crate::routes::game::kick_player,
        crate::routes::game::start_game,
        crate::routes::game::claim_deal,
        crate::routes::game::submit_cards,
        crate::routes::game::select_winner,
        crate::routes::game::advance_round,
        crate::routes::game::force_end_game,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::SubmitCardsRequest,
            crate::dto::game::SelectWinnerRequest,
            crate::dto::game::KickPlayerRequest,
            crate::dto::game::GameSummary,
            crate::dto::game::GameSettingsSummary,
            crate::dto::game::ScoreEntry,
            crate::dto::game::JoinResponse,
            crate::dto::game::ClaimResponse,
            crate::dto::game::SubmitResponse,
            crate::dto::game::WinnerResponse,
            crate::dto::game::AdvanceResponse,
            crate::dto::projection::ProjectionEvent,
            crate::dto::projection::SubmissionView,
            crate::dto::projection::BlackCardView,
            crate::dto::projection::WhiteCardView,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::state::deck::DeckMetadata,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Lobby management"),
        (name = "round", description = "Round play"),
        (name = "decks", description = "Deck catalogue"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in ["/games", "/games/{id}/submit", "/games/{id}/events", "/decks"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
