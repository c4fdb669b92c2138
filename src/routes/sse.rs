use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError, routes::user::UserId, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/games/{id}/events",
    tag = "sse",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    responses(
        (status = 200, description = "Projection stream (`handshake`, `projection`, `system_status` events)", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown game")
    )
)]
/// Stream the caller's view of a game. While the stream is open this
/// instance also supervises the game on the caller's behalf.
pub async fn game_events(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let stream = sse_service::subscribe_game(&state, id, &user).await?;
    info!(game_id = %id, user = %user, "new game stream");
    Ok(sse_service::to_sse_stream(stream))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/games/{id}/events", get(game_events))
}
