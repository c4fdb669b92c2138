use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::{DocKey, GameStore},
        models::{GameEntity, GameStatus, RoundEntity},
    },
    dto::game::{
        AdvanceResponse, ClaimResponse, CreateGameRequest, GameSummary, JoinResponse,
        SelectWinnerRequest, SubmitCardsRequest, SubmitResponse, WinnerResponse,
    },
    error::ServiceError,
    state::{SharedState, deck::DeckMetadata, transitions, transitions::TransitionError},
};

/// Log a refused transition at a level matching its cause, then convert it.
fn rejected(operation: &'static str, game_id: Uuid, err: TransitionError) -> ServiceError {
    if err.is_expected() {
        debug!(operation, game_id = %game_id, reason = %err, "transition refused");
    } else {
        warn!(operation, game_id = %game_id, error = %err, "transition failed");
    }
    err.into()
}

async fn read_game(store: &dyn GameStore, id: Uuid) -> Result<GameEntity, ServiceError> {
    let key = DocKey::Game(id);
    let Some(versioned) = store.read(key.clone()).await? else {
        return Err(ServiceError::NotFound(format!("game `{id}` not found")));
    };
    Ok(versioned.value.into_game(&key)?)
}

async fn read_round(
    store: &dyn GameStore,
    id: Uuid,
    number: u32,
) -> Result<RoundEntity, ServiceError> {
    let key = DocKey::round(id, number);
    let Some(versioned) = store.read(key.clone()).await? else {
        return Err(ServiceError::NotFound(format!(
            "round {number} of game `{id}` not found"
        )));
    };
    Ok(versioned.value.into_round(&key)?)
}

/// Games that have not finished yet.
pub async fn list_games(state: &SharedState) -> Result<Vec<GameSummary>, ServiceError> {
    let store = state.require_game_store().await?;
    let games = store.list_games().await?;
    Ok(games
        .into_iter()
        .filter(|game| game.status != GameStatus::Finished)
        .map(Into::into)
        .collect())
}

pub async fn get_game(state: &SharedState, id: Uuid) -> Result<GameSummary, ServiceError> {
    let store = state.require_game_store().await?;
    Ok(read_game(store.as_ref(), id).await?.into())
}

/// Built-in decks selectable at creation.
pub fn list_decks(state: &SharedState) -> Vec<DeckMetadata> {
    state.decks().catalog()
}

/// Open a lobby hosted by `user`.
pub async fn create_game(
    state: &SharedState,
    user: &str,
    request: CreateGameRequest,
) -> Result<GameSummary, ServiceError> {
    let store = state.require_game_store().await?;
    let settings = request.into_settings(&state.config().default_settings);
    let game = transitions::create_game(store, user, settings)
        .await
        .map_err(|err| rejected("create_game", Uuid::nil(), err))?;
    Ok(game.into())
}

pub async fn join_game(
    state: &SharedState,
    id: Uuid,
    user: &str,
) -> Result<JoinResponse, ServiceError> {
    let store = state.require_game_store().await?;
    let joined = transitions::join_game(store, id, user)
        .await
        .map_err(|err| rejected("join_game", id, err))?;
    Ok(JoinResponse { joined })
}

pub async fn leave_game(state: &SharedState, id: Uuid, user: &str) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    transitions::leave_game(store, id, user)
        .await
        .map_err(|err| rejected("leave_game", id, err))
}

pub async fn kick_player(
    state: &SharedState,
    id: Uuid,
    user: &str,
    target: &str,
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    transitions::kick_player(store, id, user, target)
        .await
        .map_err(|err| rejected("kick_player", id, err))
}

/// Host-only: deal hands and open round 1 with the game's deck.
pub async fn start_game(state: &SharedState, id: Uuid, user: &str) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    let game = read_game(store.as_ref(), id).await?;
    let deck = state
        .decks()
        .resolve(store.as_ref(), &game.settings.deck_id)
        .await;
    transitions::start_game(store, id, user, &deck)
        .await
        .map_err(|err| rejected("start_game", id, err))
}

pub async fn claim_deal(
    state: &SharedState,
    id: Uuid,
    user: &str,
) -> Result<ClaimResponse, ServiceError> {
    let store = state.require_game_store().await?;
    let game = read_game(store.as_ref(), id).await?;
    let deck = state
        .decks()
        .resolve(store.as_ref(), &game.settings.deck_id)
        .await;
    let claimed = transitions::claim_deal(store, id, user, &deck)
        .await
        .map_err(|err| rejected("claim_deal", id, err))?;
    Ok(ClaimResponse { claimed })
}

pub async fn submit_cards(
    state: &SharedState,
    id: Uuid,
    user: &str,
    request: SubmitCardsRequest,
) -> Result<SubmitResponse, ServiceError> {
    let store = state.require_game_store().await?;
    let outcome = transitions::submit_cards(store, id, request.round, user, &request.card_ids)
        .await
        .map_err(|err| rejected("submit_cards", id, err))?;
    Ok(outcome.into())
}

/// Judge-only: close the round, awarding a point to `winner_id`.
pub async fn select_winner(
    state: &SharedState,
    id: Uuid,
    user: &str,
    request: SelectWinnerRequest,
) -> Result<WinnerResponse, ServiceError> {
    let store = state.require_game_store().await?;
    let round = read_round(store.as_ref(), id, request.round).await?;
    if round.judge_id != user {
        return Err(ServiceError::Unauthorized(format!(
            "`{user}` is not the judge of round {}",
            request.round
        )));
    }

    let outcome = transitions::select_winner(
        store,
        id,
        request.round,
        &request.winner_id,
        true,
        state.config().round_advance_delay,
    )
    .await
    .map_err(|err| rejected("select_winner", id, err))?;
    Ok(outcome.into())
}

/// Skip the between-rounds countdown. Allowed for the host and for the judge
/// of the round that just ended.
pub async fn advance_round(
    state: &SharedState,
    id: Uuid,
    user: &str,
) -> Result<AdvanceResponse, ServiceError> {
    let store = state.require_game_store().await?;
    let game = read_game(store.as_ref(), id).await?;
    let deck = state
        .decks()
        .resolve(store.as_ref(), &game.settings.deck_id)
        .await;
    let outcome = transitions::skip_countdown(store, id, user, &deck)
        .await
        .map_err(|err| rejected("advance_round", id, err))?;
    info!(game_id = %id, user, "countdown skipped");
    Ok(outcome.into())
}

pub async fn force_end_game(state: &SharedState, id: Uuid, user: &str) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;
    transitions::force_end_game(store, id, user)
        .await
        .map_err(|err| rejected("force_end_game", id, err))
}
