use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::game::{
        AdvanceResponse, ClaimResponse, CreateGameRequest, GameSummary, JoinResponse,
        KickPlayerRequest, SelectWinnerRequest, SubmitCardsRequest, SubmitResponse,
        WinnerResponse,
    },
    error::AppError,
    routes::user::UserId,
    services::game_service,
    state::SharedState,
};

/// Lobby and round operations. Every route identifies the caller through
/// the `X-User-Id` header.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", get(list_games).post(create_game))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/join", post(join_game))
        .route("/games/{id}/leave", post(leave_game))
        .route("/games/{id}/kick", post(kick_player))
        .route("/games/{id}/start", post(start_game))
        .route("/games/{id}/claim", post(claim_deal))
        .route("/games/{id}/submit", post(submit_cards))
        .route("/games/{id}/winner", post(select_winner))
        .route("/games/{id}/advance", post(advance_round))
        .route("/games/{id}/end", post(force_end_game))
}

/// List games that have not finished.
#[utoipa::path(
    get,
    path = "/games",
    tag = "game",
    responses((status = 200, description = "Open and running games", body = [GameSummary]))
)]
pub async fn list_games(
    State(state): State<SharedState>,
) -> Result<Json<Vec<GameSummary>>, AppError> {
    Ok(Json(game_service::list_games(&state).await?))
}

/// Open a lobby hosted by the caller.
#[utoipa::path(
    post,
    path = "/games",
    tag = "game",
    params(("X-User-Id" = String, Header, description = "Caller identity")),
    request_body = CreateGameRequest,
    responses(
        (status = 200, description = "Game created", body = GameSummary),
        (status = 400, description = "Invalid settings")
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Valid(Json(payload)): Valid<Json<CreateGameRequest>>,
) -> Result<Json<GameSummary>, AppError> {
    Ok(Json(
        game_service::create_game(&state, &user, payload).await?,
    ))
}

/// Retrieve a game by its identifier.
#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "game",
    params(("id" = String, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Game", body = GameSummary),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    Ok(Json(game_service::get_game(&state, id).await?))
}

/// Join a waiting lobby.
#[utoipa::path(
    post,
    path = "/games/{id}/join",
    tag = "game",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    responses(
        (status = 200, description = "Joined (or already a member)", body = JoinResponse),
        (status = 409, description = "Game already started")
    )
)]
pub async fn join_game(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<JoinResponse>, AppError> {
    Ok(Json(game_service::join_game(&state, id, &user).await?))
}

/// Leave a game at any stage.
#[utoipa::path(
    post,
    path = "/games/{id}/leave",
    tag = "game",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    responses((status = 204, description = "Left the game"))
)]
pub async fn leave_game(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    game_service::leave_game(&state, id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host-only: remove a player from the lobby.
#[utoipa::path(
    post,
    path = "/games/{id}/kick",
    tag = "game",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    request_body = KickPlayerRequest,
    responses(
        (status = 204, description = "Player removed"),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Not in the lobby, or self-kick")
    )
)]
pub async fn kick_player(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<KickPlayerRequest>>,
) -> Result<StatusCode, AppError> {
    game_service::kick_player(&state, id, &user, &payload.player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host-only: deal the opening hands and start round 1.
#[utoipa::path(
    post,
    path = "/games/{id}/start",
    tag = "game",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    responses(
        (status = 204, description = "Game started"),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Already started, not enough players, or hands too small for the deck")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    game_service::start_game(&state, id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Move the caller's pending deal into their hand.
#[utoipa::path(
    post,
    path = "/games/{id}/claim",
    tag = "round",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    responses(
        (status = 200, description = "Cards claimed", body = ClaimResponse),
        (status = 409, description = "Nothing to claim or game finished")
    )
)]
pub async fn claim_deal(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<ClaimResponse>, AppError> {
    Ok(Json(game_service::claim_deal(&state, id, &user).await?))
}

/// Submit cards for the current round.
#[utoipa::path(
    post,
    path = "/games/{id}/submit",
    tag = "round",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    request_body = SubmitCardsRequest,
    responses(
        (status = 200, description = "Submission recorded", body = SubmitResponse),
        (status = 409, description = "Wrong phase, already submitted or invalid selection")
    )
)]
pub async fn submit_cards(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitCardsRequest>>,
) -> Result<Json<SubmitResponse>, AppError> {
    Ok(Json(
        game_service::submit_cards(&state, id, &user, payload).await?,
    ))
}

/// Judge-only: pick the winning submission.
#[utoipa::path(
    post,
    path = "/games/{id}/winner",
    tag = "round",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    request_body = SelectWinnerRequest,
    responses(
        (status = 200, description = "Round judged", body = WinnerResponse),
        (status = 401, description = "Caller is not the judge"),
        (status = 409, description = "Round not being judged")
    )
)]
pub async fn select_winner(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SelectWinnerRequest>>,
) -> Result<Json<WinnerResponse>, AppError> {
    Ok(Json(
        game_service::select_winner(&state, id, &user, payload).await?,
    ))
}

/// Host or judge: skip the countdown and start the next round.
#[utoipa::path(
    post,
    path = "/games/{id}/advance",
    tag = "round",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    responses(
        (status = 200, description = "Next round started or game finished", body = AdvanceResponse),
        (status = 401, description = "Caller is neither the host nor the judge"),
        (status = 409, description = "Round not over")
    )
)]
pub async fn advance_round(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<AdvanceResponse>, AppError> {
    Ok(Json(game_service::advance_round(&state, id, &user).await?))
}

/// Host-only: finish the game immediately.
#[utoipa::path(
    post,
    path = "/games/{id}/end",
    tag = "game",
    params(
        ("X-User-Id" = String, Header, description = "Caller identity"),
        ("id" = String, Path, description = "Identifier of the game")
    ),
    responses(
        (status = 204, description = "Game finished"),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Already finished")
    )
)]
pub async fn force_end_game(
    State(state): State<SharedState>,
    UserId(user): UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    game_service::force_end_game(&state, id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
