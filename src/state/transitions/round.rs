use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    IntegrityError, Precondition, TransitionResult, apply_game_event, apply_round_event,
    require_current_round, require_game_status, require_host, require_round_status,
};
use crate::{
    dao::{
        game_store::GameStore,
        models::{
            BlackCardEntity, GameEntity, GameStatus, HandEntity, RoundEntity, RoundStatus,
            SubmissionEntity, WhiteCardEntity,
        },
    },
    state::{deck::Deck, rules, state_machine::StatusEvent, transaction::Transaction},
};

/// How a corrective submission chooses cards from the hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPick {
    /// First cards of the hand; used by a player's own timeout.
    First,
    /// Random cards; used when the host submits for a stalled player.
    Random,
}

/// Result of a committed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// This submission was the last one and moved the round to judging.
    pub all_submitted: bool,
}

/// Result of a committed winner selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinnerOutcome {
    pub game_finished: bool,
    pub point_awarded: bool,
}

/// Result of a committed round advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Started { round_number: u32, judge_id: String },
    /// The black pool ran dry, so the match ended instead.
    Finished,
}

fn shuffled_pools(deck: &Deck) -> (Vec<String>, Vec<String>) {
    let mut rng = rand::rng();
    let mut whites: Vec<String> = deck.white_cards.keys().cloned().collect();
    let mut blacks: Vec<String> = deck.black_cards.keys().cloned().collect();
    whites.shuffle(&mut rng);
    blacks.shuffle(&mut rng);
    (whites, blacks)
}

fn draw_black_card(game: &mut GameEntity, deck: &Deck) -> TransitionResult<BlackCardEntity> {
    if game.deck.black_card_ids.is_empty() {
        return Err(Precondition::DeckTooSmall {
            deck_id: deck.id.clone(),
        }
        .into());
    }
    let card_id = game.deck.black_card_ids.remove(0);
    deck.black_card(&card_id)
        .cloned()
        .ok_or_else(|| unknown_card(card_id, deck))
}

fn unknown_card(card_id: String, deck: &Deck) -> super::TransitionError {
    IntegrityError::UnknownCard {
        card_id,
        deck_id: deck.id.clone(),
    }
    .into()
}

fn new_round(
    round_number: u32,
    judge_id: String,
    black_card: BlackCardEntity,
    now: SystemTime,
) -> RoundEntity {
    RoundEntity {
        round_number,
        judge_id,
        black_card,
        submissions: IndexMap::new(),
        winner_id: None,
        winning_cards: None,
        status: RoundStatus::Submitting,
        started_at: now,
        judging_started_at: None,
        completed_at: None,
    }
}

fn judge_at(game: &GameEntity, index: usize) -> TransitionResult<String> {
    game.player_uids.get(index).cloned().ok_or_else(|| {
        IntegrityError::JudgeOutOfRange {
            index,
            count: game.player_uids.len(),
        }
        .into()
    })
}

/// Host-only: deal opening hands into `pending_deals` and open round 1.
pub async fn start_game(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    host: &str,
    deck: &Deck,
) -> TransitionResult<()> {
    let mut tx = Transaction::begin(store);
    let mut game = tx.game(game_id).await?;
    let now = tx.now();

    require_host(&game, host)?;
    require_game_status(&game, GameStatus::Waiting)?;
    if !rules::can_start(&game.player_uids) {
        return Err(Precondition::NotEnoughPlayers {
            count: game.player_uids.len(),
        }
        .into());
    }

    let per_hand = game.settings.cards_per_hand;
    let (mut whites, blacks) = shuffled_pools(deck);
    if whites.len() < per_hand * game.player_uids.len() || blacks.is_empty() {
        return Err(Precondition::DeckTooSmall {
            deck_id: deck.id.clone(),
        }
        .into());
    }
    // A hand must be able to answer any black card of the deck.
    let max_pick = deck.black_cards.values().map(|card| card.pick).max().unwrap_or(1);
    if per_hand < max_pick as usize {
        return Err(Precondition::HandSmallerThanPick {
            cards_per_hand: per_hand,
            pick: max_pick,
        }
        .into());
    }

    let pending_deals: IndexMap<String, Vec<String>> = game
        .player_uids
        .iter()
        .map(|player| (player.clone(), whites.drain(..per_hand).collect()))
        .collect();
    game.deck.white_card_ids = whites;
    game.deck.black_card_ids = blacks;
    let black_card = draw_black_card(&mut game, deck)?;

    apply_game_event(&mut game, StatusEvent::Start)?;
    game.current_round = 1;
    game.current_judge_index = 0;
    game.pending_deals = pending_deals;
    game.scores = game
        .player_uids
        .iter()
        .map(|player| (player.clone(), 0))
        .collect();
    game.next_round_at = None;
    game.updated_at = now;

    let judge_id = judge_at(&game, 0)?;
    for player in &game.player_uids {
        tx.put_hand(game_id, player, HandEntity::empty(now));
    }
    tx.put_round(game_id, new_round(1, judge_id.clone(), black_card, now));
    let players = game.player_uids.len();
    tx.put_game(game);
    tx.commit().await?;

    info!(game_id = %game_id, players, judge = %judge_id, "game started");
    Ok(())
}

/// Move `user`'s pending deal into their hand. Returns the number of cards.
pub async fn claim_deal(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    user: &str,
    deck: &Deck,
) -> TransitionResult<usize> {
    let mut tx = Transaction::begin(store);
    let mut game = tx.game(game_id).await?;
    let now = tx.now();

    if game.status == GameStatus::Finished {
        return Err(Precondition::GameFinished.into());
    }
    let card_ids = match game.pending_deals.get(user) {
        Some(ids) if !ids.is_empty() => ids.clone(),
        _ => return Err(Precondition::NoPendingDeal { user: user.into() }.into()),
    };
    let cards = card_ids
        .into_iter()
        .map(|id| match deck.white_card(&id) {
            Some(card) => Ok(card.clone()),
            None => Err(unknown_card(id, deck)),
        })
        .collect::<TransitionResult<Vec<WhiteCardEntity>>>()?;

    let mut hand = tx
        .find_hand(game_id, user)
        .await?
        .unwrap_or_else(|| HandEntity::empty(now));
    let claimed = cards.len();
    hand.cards.extend(cards);
    hand.last_updated = now;

    game.pending_deals.shift_remove(user);
    game.updated_at = now;

    tx.put_hand(game_id, user, hand);
    tx.put_game(game);
    tx.commit().await?;

    debug!(game_id = %game_id, user, claimed, "pending deal claimed");
    Ok(claimed)
}

struct SubmissionContext {
    game: GameEntity,
    round: RoundEntity,
    hand: HandEntity,
}

async fn load_submission_context(
    tx: &mut Transaction,
    game_id: Uuid,
    round_number: u32,
    user: &str,
) -> TransitionResult<SubmissionContext> {
    let game = tx.game(game_id).await?;
    require_game_status(&game, GameStatus::Playing)?;
    require_current_round(&game, round_number)?;
    let round = tx.round(game_id, round_number).await?;
    require_round_status(&round, RoundStatus::Submitting)?;

    if !game.player_uids.iter().any(|id| id == user) {
        return Err(Precondition::NotPlayer { user: user.into() }.into());
    }
    if round.judge_id == user {
        return Err(Precondition::JudgeCannotSubmit.into());
    }
    if round.submissions.contains_key(user) {
        return Err(Precondition::AlreadySubmitted { user: user.into() }.into());
    }

    let hand = tx.hand(game_id, user).await?;
    Ok(SubmissionContext { game, round, hand })
}

/// Record the submission and, when it completes the round, flip round and
/// game to judging in the same commit.
async fn commit_submission(
    mut tx: Transaction,
    context: SubmissionContext,
    user: &str,
    card_ids: &[String],
) -> TransitionResult<SubmitOutcome> {
    let SubmissionContext {
        mut game,
        mut round,
        mut hand,
    } = context;
    let now = tx.now();
    let game_id = game.id;

    if !rules::is_valid_submission(&hand.cards, card_ids, &round.black_card) {
        return Err(Precondition::InvalidSubmission.into());
    }

    let cards: Vec<WhiteCardEntity> = card_ids
        .iter()
        .filter_map(|id| hand.cards.iter().find(|card| &card.id == id).cloned())
        .collect();
    hand.cards.retain(|card| !card_ids.contains(&card.id));
    hand.last_updated = now;
    round.submissions.insert(
        user.to_owned(),
        SubmissionEntity {
            cards,
            submitted_at: now,
        },
    );

    let all_submitted =
        rules::is_round_complete(&round.submissions, &game.player_uids, &round.judge_id);
    if all_submitted {
        apply_round_event(&mut round, StatusEvent::AllSubmitted)?;
        apply_game_event(&mut game, StatusEvent::AllSubmitted)?;
        round.judging_started_at = Some(now);
        game.updated_at = now;
        tx.put_game(game);
    }

    let round_number = round.round_number;
    tx.put_hand(game_id, user, hand);
    tx.put_round(game_id, round);
    tx.commit().await?;

    debug!(game_id = %game_id, round = round_number, user, all_submitted, "cards submitted");
    if all_submitted {
        info!(game_id = %game_id, round = round_number, "all cards in; judging");
    }
    Ok(SubmitOutcome { all_submitted })
}

/// Submit `card_ids` from `user`'s hand for the current round.
pub async fn submit_cards(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    round_number: u32,
    user: &str,
    card_ids: &[String],
) -> TransitionResult<SubmitOutcome> {
    let mut tx = Transaction::begin(store);
    let context = load_submission_context(&mut tx, game_id, round_number, user).await?;
    commit_submission(tx, context, user, card_ids).await
}

/// Corrective submission whose cards are chosen from the hand as read inside
/// the transaction.
pub async fn auto_submit(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    round_number: u32,
    user: &str,
    pick: AutoPick,
) -> TransitionResult<SubmitOutcome> {
    let mut tx = Transaction::begin(store);
    let context = load_submission_context(&mut tx, game_id, round_number, user).await?;

    let required = context.round.black_card.pick;
    let chosen = match pick {
        AutoPick::First => rules::first_available_pick(&context.hand.cards, required),
        AutoPick::Random => {
            let mut rng = rand::rng();
            rules::random_pick(&context.hand.cards, required, &mut rng)
        }
    };
    let Some(card_ids) = chosen else {
        return Err(Precondition::HandTooSmall { user: user.into() }.into());
    };

    commit_submission(tx, context, user, &card_ids).await
}

/// Close the round with `winner_id`. With `award_point == false` the round
/// completes without changing any score.
pub async fn select_winner(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    round_number: u32,
    winner_id: &str,
    award_point: bool,
    advance_delay: Duration,
) -> TransitionResult<WinnerOutcome> {
    let mut tx = Transaction::begin(store);
    let mut game = tx.game(game_id).await?;
    let now = tx.now();

    require_current_round(&game, round_number)?;
    let mut round = tx.round(game_id, round_number).await?;
    require_round_status(&round, RoundStatus::Judging)?;
    let Some(winning_cards) = round
        .submissions
        .get(winner_id)
        .map(|submission| submission.cards.clone())
    else {
        return Err(Precondition::NoSubmission {
            player: winner_id.into(),
        }
        .into());
    };

    round.winner_id = Some(winner_id.to_owned());
    round.winning_cards = Some(winning_cards);
    round.completed_at = Some(now);

    // Departed players keep their submission but no longer score.
    let mut point_awarded = false;
    if award_point {
        if let Some(score) = game.scores.get_mut(winner_id) {
            *score += 1;
            point_awarded = true;
        }
    }

    let game_over = rules::game_winner(&game.scores, game.settings.winning_score).is_some();
    let event = StatusEvent::WinnerSelected { game_over };
    apply_round_event(&mut round, event)?;
    apply_game_event(&mut game, event)?;
    game.next_round_at = if game_over {
        None
    } else {
        Some(now + advance_delay)
    };
    game.updated_at = now;

    tx.put_round(game_id, round);
    tx.put_game(game);
    tx.commit().await?;

    info!(
        game_id = %game_id,
        round = round_number,
        winner = winner_id,
        point_awarded,
        game_over,
        "round judged"
    );
    Ok(WinnerOutcome {
        game_finished: game_over,
        point_awarded,
    })
}

/// Rotate the judge, top hands up through `pending_deals` and open the next
/// round. Only the first of several concurrent callers commits.
pub async fn advance_round(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    deck: &Deck,
) -> TransitionResult<AdvanceOutcome> {
    let mut tx = Transaction::begin(store);
    let game = tx.game(game_id).await?;
    advance_loaded(tx, game, deck).await
}

/// Skip the between-rounds countdown. Allowed for the host and for the judge
/// of the round that just ended, checked on the data the advance commits on.
pub async fn skip_countdown(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    user: &str,
    deck: &Deck,
) -> TransitionResult<AdvanceOutcome> {
    let mut tx = Transaction::begin(store);
    let game = tx.game(game_id).await?;
    if game.host_id != user {
        let round = tx.round(game_id, game.current_round).await?;
        if round.judge_id != user {
            return Err(Precondition::NotHostOrJudge { user: user.into() }.into());
        }
    }
    advance_loaded(tx, game, deck).await
}

async fn finish_exhausted(
    mut tx: Transaction,
    mut game: GameEntity,
    reason: &'static str,
) -> TransitionResult<AdvanceOutcome> {
    let game_id = game.id;
    apply_game_event(&mut game, StatusEvent::DeckExhausted)?;
    game.next_round_at = None;
    game.updated_at = tx.now();
    tx.put_game(game);
    tx.commit().await?;
    info!(game_id = %game_id, reason, "deck exhausted; game finished");
    Ok(AdvanceOutcome::Finished)
}

async fn advance_loaded(
    mut tx: Transaction,
    mut game: GameEntity,
    deck: &Deck,
) -> TransitionResult<AdvanceOutcome> {
    let game_id = game.id;
    let now = tx.now();

    require_game_status(&game, GameStatus::RoundEnd)?;

    let Some(next_black) = game.deck.black_card_ids.first().cloned() else {
        return finish_exhausted(tx, game, "no black card left").await;
    };
    let pick = match deck.black_card(&next_black) {
        Some(card) => card.pick as usize,
        None => return Err(unknown_card(next_black, deck)),
    };

    let next_index = rules::next_judge_index(game.current_judge_index, game.player_uids.len());
    let judge_id = judge_at(&game, next_index)?;

    // Plan the top-up first so a short table finishes on the untouched game.
    let per_hand = game.settings.cards_per_hand;
    let mut pool = game.deck.white_card_ids.clone();
    let mut deals: Vec<(String, Vec<String>)> = Vec::new();
    let mut short_handed = false;
    for player in game.player_uids.clone() {
        let held = tx
            .find_hand(game_id, &player)
            .await?
            .map_or(0, |hand| hand.cards.len());
        let pending = game.pending_deals.get(&player).map_or(0, Vec::len);
        let deficit = per_hand.saturating_sub(held + pending).min(pool.len());
        let dealt: Vec<String> = pool.drain(..deficit).collect();
        if player != judge_id && held + pending + dealt.len() < pick {
            short_handed = true;
        }
        if !dealt.is_empty() {
            deals.push((player, dealt));
        }
    }
    if short_handed {
        return finish_exhausted(tx, game, "white cards cannot cover the next black card").await;
    }

    game.deck.white_card_ids = pool;
    for (player, dealt) in deals {
        game.pending_deals.entry(player).or_default().extend(dealt);
    }

    let black_card = draw_black_card(&mut game, deck)?;
    let round_number = game.current_round + 1;

    apply_game_event(&mut game, StatusEvent::Advance)?;
    game.current_round = round_number;
    game.current_judge_index = next_index;
    game.next_round_at = None;
    game.updated_at = now;

    tx.put_round(
        game_id,
        new_round(round_number, judge_id.clone(), black_card, now),
    );
    tx.put_game(game);
    tx.commit().await?;

    info!(game_id = %game_id, round = round_number, judge = %judge_id, "round started");
    Ok(AdvanceOutcome::Started {
        round_number,
        judge_id,
    })
}

/// Set the advance countdown target when a finished round has none.
pub async fn schedule_round_advance(
    store: Arc<dyn GameStore>,
    game_id: Uuid,
    at: SystemTime,
) -> TransitionResult<()> {
    let mut tx = Transaction::begin(store);
    let mut game = tx.game(game_id).await?;

    require_game_status(&game, GameStatus::RoundEnd)?;
    if game.next_round_at.is_some() {
        return Err(Precondition::AdvanceAlreadyScheduled.into());
    }

    game.next_round_at = Some(at);
    game.updated_at = tx.now();
    tx.put_game(game);
    tx.commit().await?;
    debug!(game_id = %game_id, "round advance scheduled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        dao::models::{CustomDeckEntity, RawBlackCard, RawWhiteCard},
        state::transitions::{TransitionError, create_game, fixtures, force_end_game, join_game},
    };

    /// Two pick-1 prompts and exactly one white card per player of a 3-table.
    fn tiny_deck() -> Deck {
        let black_cards = (0..2)
            .map(|index| RawBlackCard {
                text: format!("prompt {index} _____"),
                pick: 1,
            })
            .collect();
        let white_cards = (0..3)
            .map(|index| RawWhiteCard::Text(format!("answer {index}")))
            .collect();
        Deck::from_source(
            "tiny",
            CustomDeckEntity {
                name: "Tiny".into(),
                description: String::new(),
                black_cards,
                white_cards,
            },
        )
    }

    async fn lobby(
        store: &Arc<dyn GameStore>,
        settings: crate::dao::models::GameSettingsEntity,
    ) -> Uuid {
        let game = create_game(store.clone(), "a", settings).await.unwrap();
        for player in ["b", "c"] {
            join_game(store.clone(), game.id, player).await.unwrap();
        }
        game.id
    }

    struct Snapshot {
        game: GameEntity,
        round: RoundEntity,
    }

    async fn snapshot(store: &Arc<dyn GameStore>, game_id: Uuid) -> Snapshot {
        let mut tx = Transaction::begin(store.clone());
        let game = tx.game(game_id).await.unwrap();
        let round = tx.round(game_id, game.current_round).await.unwrap();
        Snapshot { game, round }
    }

    async fn snapshot_game(store: &Arc<dyn GameStore>, game_id: Uuid) -> GameEntity {
        let mut tx = Transaction::begin(store.clone());
        tx.game(game_id).await.unwrap()
    }

    async fn hand_of(store: &Arc<dyn GameStore>, game_id: Uuid, player: &str) -> HandEntity {
        let mut tx = Transaction::begin(store.clone());
        tx.hand(game_id, player).await.unwrap()
    }

    async fn submit_first(store: &Arc<dyn GameStore>, game_id: Uuid, player: &str) {
        let round = snapshot(store, game_id).await.game.current_round;
        auto_submit(store.clone(), game_id, round, player, AutoPick::First)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn start_deals_distinct_cards_to_every_player() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game = create_game(store.clone(), "a", fixtures::settings(5))
            .await
            .unwrap();
        for player in ["b", "c"] {
            join_game(store.clone(), game.id, player).await.unwrap();
        }
        start_game(store.clone(), game.id, "a", &deck).await.unwrap();

        let Snapshot { game, round } = snapshot(&store, game.id).await;
        assert_eq!(game.status, GameStatus::Playing);
        assert_eq!(game.current_round, 1);
        assert_eq!(round.round_number, 1);
        assert_eq!(round.judge_id, "a");
        assert_eq!(round.status, RoundStatus::Submitting);

        let mut seen = HashSet::new();
        for player in ["a", "b", "c"] {
            let dealt = game.pending_deals.get(player).unwrap();
            assert_eq!(dealt.len(), 7);
            for id in dealt {
                assert!(seen.insert(id.clone()), "card {id} dealt twice");
                assert!(!game.deck.white_card_ids.contains(id));
            }
            assert!(hand_of(&store, game.id, player).await.cards.is_empty());
        }
        assert!(!game.deck.black_card_ids.contains(&round.black_card.id));
    }

    #[tokio::test]
    async fn start_requires_three_players() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game = create_game(store.clone(), "a", fixtures::settings(5))
            .await
            .unwrap();
        join_game(store.clone(), game.id, "b").await.unwrap();

        let err = start_game(store.clone(), game.id, "a", &deck).await.unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::NotEnoughPlayers { count: 2 })
        ));
    }

    #[tokio::test]
    async fn claim_moves_pending_cards_once() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;

        assert_eq!(hand_of(&store, game_id, "b").await.cards.len(), 7);
        let err = claim_deal(store.clone(), game_id, "b", &deck)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::NoPendingDeal { .. })
        ));
        assert_eq!(hand_of(&store, game_id, "b").await.cards.len(), 7);
    }

    #[tokio::test]
    async fn resubmission_keeps_the_first_submission() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;
        let pick = snapshot(&store, game_id).await.round.black_card.pick;
        let hand = hand_of(&store, game_id, "b").await;
        let first = rules::first_available_pick(&hand.cards, pick).unwrap();

        submit_cards(store.clone(), game_id, 1, "b", &first)
            .await
            .unwrap();
        let recorded = snapshot(&store, game_id).await.round.submissions["b"].clone();

        let err = submit_cards(store.clone(), game_id, 1, "b", &first)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::AlreadySubmitted { .. })
        ));
        assert_eq!(snapshot(&store, game_id).await.round.submissions["b"], recorded);
    }

    #[tokio::test]
    async fn invalid_selection_leaves_hand_untouched() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;
        let pick = snapshot(&store, game_id).await.round.black_card.pick as usize;
        let before = hand_of(&store, game_id, "b").await;

        let mut selection: Vec<String> = before
            .cards
            .iter()
            .take(pick - 1)
            .map(|card| card.id.clone())
            .collect();
        selection.push("w-default-not-held".into());

        let err = submit_cards(store.clone(), game_id, 1, "b", &selection)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::InvalidSubmission)
        ));
        assert_eq!(hand_of(&store, game_id, "b").await.cards, before.cards);
        assert!(snapshot(&store, game_id).await.round.submissions.is_empty());
    }

    #[tokio::test]
    async fn judge_cannot_submit() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;

        let err = auto_submit(store.clone(), game_id, 1, "a", AutoPick::First)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::JudgeCannotSubmit)
        ));
    }

    #[tokio::test]
    async fn submitted_cards_leave_the_hand() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;
        let before = hand_of(&store, game_id, "c").await;

        auto_submit(store.clone(), game_id, 1, "c", AutoPick::Random)
            .await
            .unwrap();

        let after = hand_of(&store, game_id, "c").await;
        let submitted = snapshot(&store, game_id).await.round.submissions["c"]
            .cards
            .clone();
        for card in &before.cards {
            let in_hand = after.cards.contains(card);
            let in_submission = submitted.contains(card);
            assert!(in_hand ^ in_submission, "card {} misplaced", card.id);
        }
    }

    #[tokio::test]
    async fn last_submission_flips_to_judging_once() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;

        let first = auto_submit(store.clone(), game_id, 1, "b", AutoPick::First)
            .await
            .unwrap();
        assert!(!first.all_submitted);
        assert_eq!(snapshot(&store, game_id).await.game.status, GameStatus::Playing);

        let last = auto_submit(store.clone(), game_id, 1, "c", AutoPick::First)
            .await
            .unwrap();
        assert!(last.all_submitted);

        let Snapshot { game, round } = snapshot(&store, game_id).await;
        assert_eq!(game.status, GameStatus::Judging);
        assert_eq!(round.status, RoundStatus::Judging);
        assert!(round.judging_started_at.is_some());
    }

    #[tokio::test]
    async fn select_winner_twice_scores_once() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;
        submit_first(&store, game_id, "b").await;
        submit_first(&store, game_id, "c").await;

        let outcome = select_winner(store.clone(), game_id, 1, "b", true, Duration::from_secs(4))
            .await
            .unwrap();
        assert!(outcome.point_awarded);
        assert!(!outcome.game_finished);

        let err = select_winner(store.clone(), game_id, 1, "b", true, Duration::from_secs(4))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::RoundStatus { .. })
        ));

        let Snapshot { game, round } = snapshot(&store, game_id).await;
        assert_eq!(game.scores["b"], 1);
        assert_eq!(game.status, GameStatus::RoundEnd);
        assert!(game.next_round_at.is_some());
        assert_eq!(round.status, RoundStatus::Complete);
        assert_eq!(round.winner_id.as_deref(), Some("b"));
        assert!(round.completed_at.is_some());
    }

    #[tokio::test]
    async fn forced_resolution_awards_nothing() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;
        submit_first(&store, game_id, "b").await;
        submit_first(&store, game_id, "c").await;

        let outcome = select_winner(store.clone(), game_id, 1, "c", false, Duration::from_secs(4))
            .await
            .unwrap();
        assert!(!outcome.point_awarded);
        let game = snapshot(&store, game_id).await.game;
        assert!(game.scores.values().all(|score| *score == 0));
        assert_eq!(game.status, GameStatus::RoundEnd);
    }

    #[tokio::test]
    async fn advance_rotates_judge_and_tops_up_only_the_deficit() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;
        submit_first(&store, game_id, "b").await;
        submit_first(&store, game_id, "c").await;
        select_winner(store.clone(), game_id, 1, "b", true, Duration::from_secs(4))
            .await
            .unwrap();
        let pick = snapshot(&store, game_id).await.round.black_card.pick as usize;
        let pool_before = snapshot(&store, game_id).await.game.deck.white_card_ids.len();

        let outcome = advance_round(store.clone(), game_id, &deck).await.unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Started {
                round_number: 2,
                judge_id: "b".into()
            }
        );

        // Second concurrent-style attempt loses on the status precondition.
        assert!(advance_round(store.clone(), game_id, &deck).await.is_err());

        let Snapshot { game, round } = snapshot(&store, game_id).await;
        assert_eq!(game.current_judge_index, 1);
        assert_eq!(game.status, GameStatus::Playing);
        assert!(game.next_round_at.is_none());
        assert_eq!(round.round_number, 2);
        assert_eq!(round.judge_id, "b");
        assert!(!game.pending_deals.contains_key("a"));
        assert_eq!(game.pending_deals["b"].len(), pick);
        assert_eq!(game.pending_deals["c"].len(), pick);
        assert_eq!(game.deck.white_card_ids.len(), pool_before - 2 * pick);
    }

    #[tokio::test]
    async fn schedule_only_fills_a_missing_countdown() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;
        let at = SystemTime::now();
        assert!(schedule_round_advance(store.clone(), game_id, at).await.is_err());

        submit_first(&store, game_id, "b").await;
        submit_first(&store, game_id, "c").await;
        select_winner(store.clone(), game_id, 1, "b", true, Duration::from_secs(4))
            .await
            .unwrap();
        let err = schedule_round_advance(store.clone(), game_id, at)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::AdvanceAlreadyScheduled)
        ));
    }

    #[tokio::test]
    async fn only_the_host_starts_the_game() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = lobby(&store, fixtures::settings(5)).await;

        let err = start_game(store.clone(), game_id, "b", &deck)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::NotHost { .. })
        ));
        assert_eq!(snapshot_game(&store, game_id).await.status, GameStatus::Waiting);
    }

    #[tokio::test]
    async fn start_rejects_hands_smaller_than_the_largest_pick() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let mut settings = fixtures::settings(5);
        settings.cards_per_hand = 1;
        let game_id = lobby(&store, settings).await;

        let err = start_game(store.clone(), game_id, "a", &deck)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::HandSmallerThanPick {
                cards_per_hand: 1,
                pick: 2
            })
        ));
        assert_eq!(snapshot_game(&store, game_id).await.status, GameStatus::Waiting);
    }

    #[tokio::test]
    async fn advance_finishes_when_white_cards_cannot_cover_the_next_pick() {
        let store = fixtures::store();
        let deck = tiny_deck();
        let mut settings = fixtures::settings(5);
        settings.cards_per_hand = 1;
        settings.deck_id = "tiny".into();
        let game_id = lobby(&store, settings).await;
        start_game(store.clone(), game_id, "a", &deck).await.unwrap();
        for player in ["a", "b", "c"] {
            claim_deal(store.clone(), game_id, player, &deck)
                .await
                .unwrap();
        }
        submit_first(&store, game_id, "b").await;
        submit_first(&store, game_id, "c").await;
        select_winner(store.clone(), game_id, 1, "b", true, Duration::ZERO)
            .await
            .unwrap();

        // `c` played its only card and the pool is empty.
        let outcome = advance_round(store.clone(), game_id, &deck).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Finished);

        let game = snapshot_game(&store, game_id).await;
        assert_eq!(game.status, GameStatus::Finished);
        assert_eq!(game.current_round, 1);
        assert_eq!(game.deck.black_card_ids.len(), 1);
        assert!(game.pending_deals.is_empty());
        assert!(game.next_round_at.is_none());
    }

    #[tokio::test]
    async fn finished_games_refuse_submissions_and_claims() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = lobby(&store, fixtures::settings(5)).await;
        start_game(store.clone(), game_id, "a", &deck).await.unwrap();
        claim_deal(store.clone(), game_id, "b", &deck)
            .await
            .unwrap();
        force_end_game(store.clone(), game_id, "a").await.unwrap();

        let before = hand_of(&store, game_id, "b").await;
        let err = auto_submit(store.clone(), game_id, 1, "b", AutoPick::First)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::GameStatus {
                actual: GameStatus::Finished,
                ..
            })
        ));
        assert_eq!(hand_of(&store, game_id, "b").await.cards, before.cards);
        assert!(snapshot(&store, game_id).await.round.submissions.is_empty());

        let err = claim_deal(store.clone(), game_id, "c", &deck)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::GameFinished)
        ));
        assert!(hand_of(&store, game_id, "c").await.cards.is_empty());
    }

    #[tokio::test]
    async fn only_host_or_judge_skips_the_countdown() {
        let store = fixtures::store();
        let deck = fixtures::deck();
        let game_id = fixtures::started_game(&store, &deck, 5).await;
        submit_first(&store, game_id, "b").await;
        submit_first(&store, game_id, "c").await;
        select_winner(store.clone(), game_id, 1, "b", true, Duration::from_secs(4))
            .await
            .unwrap();

        let err = skip_countdown(store.clone(), game_id, "c", &deck)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Precondition(Precondition::NotHostOrJudge { .. })
        ));
        assert_eq!(snapshot_game(&store, game_id).await.status, GameStatus::RoundEnd);

        let outcome = skip_countdown(store.clone(), game_id, "a", &deck)
            .await
            .unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Started { round_number: 2, .. }));
    }
}
