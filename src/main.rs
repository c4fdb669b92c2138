//! Party cards backend entrypoint wiring REST, SSE, supervision and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use party_cards_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, MemoryGameStore},
        storage::StorageResult,
    },
    routes,
    services::{cleanup, storage_supervisor},
    state::{AppState, SharedState, deck::DeckProvider},
};

/// Store backend used when `STORE` is not set.
#[cfg(feature = "mongo-store")]
const DEFAULT_STORE: &str = "mongo";
#[cfg(not(feature = "mongo-store"))]
const DEFAULT_STORE: &str = "memory";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let decks = DeckProvider::load().context("loading built-in decks")?;
    let app_state = AppState::new(config, decks);

    spawn_storage(app_state.clone())?;
    tokio::spawn(cleanup::run(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the storage supervisor for the backend selected by `STORE`.
fn spawn_storage(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORE").unwrap_or_else(|_| DEFAULT_STORE.into());
    match backend.as_str() {
        "memory" => {
            warn!("using the in-memory store; games are lost on restart and not shared between instances");
            let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { StorageResult::Ok(store) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" | "mongodb" => {
            tokio::spawn(storage_supervisor::run(state, connect_mongo));
        }
        other => anyhow::bail!("unknown STORE backend `{other}`"),
    }
    info!(backend = %backend, "storage supervisor started");
    Ok(())
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo() -> StorageResult<Arc<dyn GameStore>> {
    use party_cards_back::dao::game_store::mongodb::{MongoConfig, MongoGameStore};

    let config = MongoConfig::from_env().await?;
    let store = MongoGameStore::connect(config).await?;
    Ok(Arc::new(store))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}
