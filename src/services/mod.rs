/// Retention of finished and abandoned games.
pub mod cleanup;
/// OpenAPI documentation generation.
pub mod documentation;
/// Lobby and round operations exposed over HTTP.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Per-client projection streams.
pub mod sse_service;
/// Storage reconnect loop and degraded mode.
pub mod storage_supervisor;
/// Per-client timeout and failover supervision.
pub mod supervisor;
