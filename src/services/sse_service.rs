use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::game_store::DocKey,
    dto::{
        projection::ProjectionEvent,
        sse::{Handshake, ServerEvent, SystemStatus},
    },
    error::ServiceError,
    services::supervisor::{self, SupervisorLease},
    state::{
        SharedState,
        projection::{Projection, ProjectionFeed},
    },
};

/// Everything a connected game stream keeps alive.
pub struct GameStream {
    game_id: Uuid,
    user: String,
    feed: ProjectionFeed,
    lease: SupervisorLease,
    degraded: watch::Receiver<bool>,
}

/// Subscribe `user` to the projection of `game_id` and start (or join) the
/// supervisor for that pair.
pub async fn subscribe_game(
    state: &SharedState,
    game_id: Uuid,
    user: &str,
) -> Result<GameStream, ServiceError> {
    let store = state.require_game_store().await?;
    if store.read(DocKey::Game(game_id)).await?.is_none() {
        return Err(ServiceError::NotFound(format!("game `{game_id}` not found")));
    }

    let feed = ProjectionFeed::start(
        store.clone(),
        game_id,
        user,
        state.config().judging_timeout,
    )
    .await?;
    let lease = supervisor::acquire(state, store, game_id, user).await?;

    Ok(GameStream {
        game_id,
        user: user.to_owned(),
        feed,
        lease,
        degraded: state.degraded_watcher(),
    })
}

fn projection_event(projection: Projection) -> Option<ServerEvent> {
    match ServerEvent::json(
        Some("projection".to_string()),
        &ProjectionEvent::from(projection),
    ) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to serialize projection");
            None
        }
    }
}

fn to_sse_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a game stream into an SSE response, forwarding projections and
/// degraded-mode changes until the client disconnects.
pub fn to_sse_stream(stream: GameStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let GameStream {
            game_id,
            user,
            feed,
            lease,
            mut degraded,
        } = stream;
        let mut projections = feed.subscribe();

        let handshake = Handshake {
            game_id,
            user_id: user.clone(),
            degraded: *degraded.borrow_and_update(),
        };
        let mut initial = Vec::new();
        if let Ok(event) = ServerEvent::json(Some("handshake".to_string()), &handshake) {
            initial.push(event);
        }
        let current = projections.borrow_and_update().clone();
        initial.extend(current.and_then(projection_event));
        for event in initial {
            if tx.send(Ok(to_sse_event(event))).await.is_err() {
                return;
            }
        }

        loop {
            let next = tokio::select! {
                _ = tx.closed() => break,
                changed = projections.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = projections.borrow_and_update().clone();
                    current.and_then(projection_event)
                }
                changed = degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = SystemStatus { degraded: *degraded.borrow_and_update() };
                    ServerEvent::json(Some("system_status".to_string()), &status).ok()
                }
            };

            if let Some(event) = next {
                if tx.send(Ok(to_sse_event(event))).await.is_err() {
                    break;
                }
            }
        }

        drop(lease);
        drop(feed);
        info!(game_id = %game_id, user = %user, "game stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
