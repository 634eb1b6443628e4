//! Application-level configuration loading: sync cadence and room defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "FASTBREAK_BACK_CONFIG_PATH";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_REVEAL_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);
const DEFAULT_QUESTION_COUNT: usize = 5;
const DEFAULT_TIMER_SECONDS: u32 = 15;
const DEFAULT_MAX_PLAYERS: usize = 4;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    timing: TimingConfig,
    room_defaults: RoomDefaults,
}

/// Cadence knobs for the session controller and the leader lease.
#[derive(Debug, Clone, Copy)]
pub struct TimingConfig {
    /// Fallback re-fetch interval while a room view is mounted.
    pub poll_interval: Duration,
    /// How long a reveal may sit before the leader auto-advances.
    pub reveal_grace: Duration,
    /// Leader lease lifetime; renewed by heartbeat at a third of this.
    pub lease_ttl: Duration,
}

/// Room settings applied when a create request leaves a knob unset.
#[derive(Debug, Clone, Copy)]
pub struct RoomDefaults {
    /// Questions per game.
    pub question_count: usize,
    /// Seconds allowed per question.
    pub timer_seconds: u32,
    /// Roster cap.
    pub max_players: usize,
}

impl AppConfig {
    /// Assemble a configuration programmatically, for embedders that manage
    /// their own settings source.
    pub fn new(timing: TimingConfig, room_defaults: RoomDefaults) -> Self {
        Self {
            timing,
            room_defaults,
        }
    }

    /// Load the application configuration from disk, falling back to built-in
    /// defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
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

    /// Sync and lease cadence.
    pub fn timing(&self) -> TimingConfig {
        self.timing
    }

    /// Defaults applied to unset create-request knobs.
    pub fn room_defaults(&self) -> RoomDefaults {
        self.room_defaults
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig {
                poll_interval: DEFAULT_POLL_INTERVAL,
                reveal_grace: DEFAULT_REVEAL_GRACE,
                lease_ttl: DEFAULT_LEASE_TTL,
            },
            room_defaults: RoomDefaults {
                question_count: DEFAULT_QUESTION_COUNT,
                timer_seconds: DEFAULT_TIMER_SECONDS,
                max_players: DEFAULT_MAX_PLAYERS,
            },
        }
    }
}

/// JSON representation of the configuration file located at
/// [`DEFAULT_CONFIG_PATH`]. Every knob is optional; durations are plain
/// integer seconds.
#[serde_as]
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    poll_interval_seconds: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    reveal_grace_seconds: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    lease_ttl_seconds: Option<Duration>,
    question_count: Option<usize>,
    timer_seconds: Option<u32>,
    max_players: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            timing: TimingConfig {
                poll_interval: raw
                    .poll_interval_seconds
                    .unwrap_or(defaults.timing.poll_interval),
                reveal_grace: raw
                    .reveal_grace_seconds
                    .unwrap_or(defaults.timing.reveal_grace),
                lease_ttl: raw.lease_ttl_seconds.unwrap_or(defaults.timing.lease_ttl),
            },
            room_defaults: RoomDefaults {
                question_count: raw
                    .question_count
                    .unwrap_or(defaults.room_defaults.question_count),
                timer_seconds: raw
                    .timer_seconds
                    .unwrap_or(defaults.room_defaults.timer_seconds),
                max_players: raw
                    .max_players
                    .unwrap_or(defaults.room_defaults.max_players),
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
