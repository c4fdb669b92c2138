//! Application-level configuration loading: phase timeouts, background job
//! cadence and the settings applied to new games.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{dao::models::GameSettingsEntity, state::deck::DEFAULT_DECK_ID};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PARTY_CARDS_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How long a judge may deliberate before the round is forced closed.
    pub judging_timeout: Duration,
    /// Pause between a judged round and the next one.
    pub round_advance_delay: Duration,
    /// Extra time the host gets to advance before any client steps in.
    pub host_grace: Duration,
    /// Supervisor evaluation cadence.
    pub supervisor_tick: Duration,
    /// Games untouched for longer than this are deleted.
    pub retention: Duration,
    /// How often the retention job runs.
    pub cleanup_interval: Duration,
    /// Settings used when a create request leaves a field out.
    pub default_settings: GameSettingsEntity,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        judging_timeout_secs = app_config.judging_timeout.as_secs(),
                        retention_hours = app_config.retention.as_secs() / 3600,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    judging_timeout_secs: u64,
    round_advance_delay_secs: u64,
    host_grace_secs: u64,
    supervisor_tick_ms: u64,
    retention_hours: u64,
    cleanup_interval_secs: u64,
    defaults: RawGameDefaults,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            judging_timeout_secs: 60,
            round_advance_delay_secs: 4,
            host_grace_secs: 10,
            supervisor_tick_ms: 1_000,
            retention_hours: 24,
            cleanup_interval_secs: 3_600,
            defaults: RawGameDefaults::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// Default game settings block inside the configuration file.
struct RawGameDefaults {
    winning_score: u32,
    cards_per_hand: usize,
    deck_id: String,
    round_timeout_secs: u64,
}

impl Default for RawGameDefaults {
    fn default() -> Self {
        Self {
            winning_score: 7,
            cards_per_hand: 7,
            deck_id: DEFAULT_DECK_ID.to_owned(),
            round_timeout_secs: 120,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            judging_timeout: Duration::from_secs(value.judging_timeout_secs),
            round_advance_delay: Duration::from_secs(value.round_advance_delay_secs),
            host_grace: Duration::from_secs(value.host_grace_secs),
            // A zero period would make `tokio::time::interval` panic.
            supervisor_tick: Duration::from_millis(value.supervisor_tick_ms.max(1)),
            retention: Duration::from_secs(value.retention_hours * 3_600),
            cleanup_interval: Duration::from_secs(value.cleanup_interval_secs.max(1)),
            default_settings: GameSettingsEntity {
                winning_score: value.defaults.winning_score,
                cards_per_hand: value.defaults.cards_per_hand,
                deck_id: value.defaults.deck_id,
                round_timeout_secs: value.defaults.round_timeout_secs,
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "judging_timeout_secs": 30, "defaults": { "winning_score": 3 } }"#)
                .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.judging_timeout, Duration::from_secs(30));
        assert_eq!(config.round_advance_delay, Duration::from_secs(4));
        assert_eq!(config.default_settings.winning_score, 3);
        assert_eq!(config.default_settings.cards_per_hand, 7);
        assert_eq!(config.default_settings.deck_id, DEFAULT_DECK_ID);
    }
}
