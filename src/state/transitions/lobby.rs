use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    Precondition, TransitionResult, apply_game_event, apply_round_event, require_game_status,
    require_host,
};
use crate::{
    dao::{
        game_store::GameStore,
        models::{DeckPoolEntity, GameEntity, GameSettingsEntity, GameStatus, RoundStatus},
    },
    state::{
        rules,
        state_machine::{StatusEvent, is_active},
        transaction::Transaction,
    },
};

/// Smallest roster that keeps a running match alive.
const MIN_ACTIVE_PLAYERS: usize = 2;

/// Create a lobby owned by `host_id`.
pub async fn create_game(
    store: Arc<dyn GameStore>,
    host_id: &str,
    settings: GameSettingsEntity,
) -> TransitionResult<GameEntity> {
    let mut tx = Transaction::begin(store);
    let id = Uuid::new_v4();
    // Stamps the id as absent so a colliding insert conflicts.
    tx.find_game(id).await?;

    let now = tx.now();
    let mut scores = IndexMap::new();
    scores.insert(host_id.to_owned(), 0);
    let game = GameEntity {
        id,
        host_id: host_id.to_owned(),
        player_uids: vec![host_id.to_owned()],
        status: GameStatus::Waiting,
        current_round: 0,
        current_judge_index: 0,
        settings,
        scores,
        deck: DeckPoolEntity::default(),
        pending_deals: IndexMap::new(),
        next_round_at: None,
        created_at: now,
        updated_at: now,
    };

    tx.put_game(game.clone());
    tx.commit().await?;
    info!(game_id = %id, host = host_id, "game created");
    Ok(game)
}

/// Add `user` to a waiting lobby. Returns `false` when already a member.
pub async fn join_game(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    user: &str,
) -> TransitionResult<bool> {
    let mut tx = Transaction::begin(store);
    let mut game = tx.game(game_id).await?;

    if game.player_uids.iter().any(|id| id == user) {
        return Ok(false);
    }
    require_game_status(&game, GameStatus::Waiting)?;

    game.player_uids.push(user.to_owned());
    game.scores.insert(user.to_owned(), 0);
    game.updated_at = tx.now();

    tx.put_game(game);
    tx.commit().await?;
    debug!(game_id = %game_id, user, "player joined");
    Ok(true)
}

/// Remove `user` from the game, keeping the running round consistent.
///
/// Completeness is always judged against the current roster, so a departing
/// submitter can complete the round; this transaction flips it to judging in
/// that case. The leaver's unclaimed cards go back to the pool.
pub async fn leave_game(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    user: &str,
) -> TransitionResult<()> {
    let mut tx = Transaction::begin(store);
    let mut game = tx.game(game_id).await?;
    let now = tx.now();

    let Some(position) = game.player_uids.iter().position(|id| id == user) else {
        return Err(Precondition::NotPlayer { user: user.into() }.into());
    };

    game.player_uids.remove(position);
    game.scores.shift_remove(user);
    if let Some(returned) = game.pending_deals.shift_remove(user) {
        game.deck.white_card_ids.extend(returned);
    }

    let remaining = game.player_uids.len();
    if position < game.current_judge_index {
        game.current_judge_index -= 1;
    } else if position == game.current_judge_index && remaining > 0 {
        // Rotation resumes with the player who followed the departed judge.
        game.current_judge_index = (position + remaining - 1) % remaining;
    }
    if game.current_judge_index >= remaining {
        game.current_judge_index = 0;
    }

    if game.host_id == user {
        if let Some(next_host) = game.player_uids.first() {
            info!(game_id = %game_id, from = user, to = %next_host, "host authority handed over");
            game.host_id = next_host.clone();
        }
    }

    if is_active(game.status) && remaining < MIN_ACTIVE_PLAYERS {
        apply_game_event(&mut game, StatusEvent::RosterDepleted)?;
        game.next_round_at = None;
        info!(game_id = %game_id, remaining, "too few players left; game finished");
    } else if game.status == GameStatus::Playing {
        let mut round = tx.round(game_id, game.current_round).await?;
        let has_live_submission = round
            .submissions
            .keys()
            .any(|id| game.player_uids.contains(id));
        if round.status == RoundStatus::Submitting
            && has_live_submission
            && rules::is_round_complete(&round.submissions, &game.player_uids, &round.judge_id)
        {
            apply_round_event(&mut round, StatusEvent::AllSubmitted)?;
            apply_game_event(&mut game, StatusEvent::AllSubmitted)?;
            round.judging_started_at = Some(now);
            tx.put_round(game_id, round);
            debug!(game_id = %game_id, "departure completed the round; judging");
        }
    }

    game.updated_at = now;
    tx.put_game(game);
    tx.commit().await?;
    info!(game_id = %game_id, user, "player left");
    Ok(())
}

/// Host-only removal of `target` from a waiting lobby.
pub async fn kick_player(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    host: &str,
    target: &str,
) -> TransitionResult<()> {
    let mut tx = Transaction::begin(store);
    let mut game = tx.game(game_id).await?;

    require_host(&game, host)?;
    require_game_status(&game, GameStatus::Waiting)?;
    if host == target {
        return Err(Precondition::KickSelf.into());
    }
    let Some(position) = game.player_uids.iter().position(|id| id == target) else {
        return Err(Precondition::NotPlayer {
            user: target.into(),
        }
        .into());
    };

    game.player_uids.remove(position);
    game.scores.shift_remove(target);
    game.updated_at = tx.now();

    tx.put_game(game);
    tx.commit().await?;
    info!(game_id = %game_id, target, "player kicked");
    Ok(())
}

/// Host-only: finish the match immediately.
pub async fn force_end_game(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    host: &str,
) -> TransitionResult<()> {
    let mut tx = Transaction::begin(store);
    let mut game = tx.game(game_id).await?;

    require_host(&game, host)?;
    apply_game_event(&mut game, StatusEvent::ForceEnd)?;
    game.next_round_at = None;
    game.updated_at = tx.now();

    tx.put_game(game);
    tx.commit().await?;
    info!(game_id = %game_id, "game force-ended by host");
    Ok(())
}
