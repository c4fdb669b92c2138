/// Document store abstraction and its backends.
pub mod game_store;
/// Persisted document shapes.
pub mod models;
/// Backend-independent storage errors.
pub mod storage;
