use chrono::TimeDelta;
use lookout_core::{DEFAULT_COOLDOWN_SECS, DEFAULT_THRESHOLD};
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database holding detection records.
    pub db_path: PathBuf,
    /// Seconds before a repeat sighting of a cached face may alert again.
    pub cooldown_secs: i64,
    /// Euclidean distance below which two encodings are the same person.
    pub similarity_threshold: f32,
    /// Buffered notifications per subscriber before lagging ones drop events.
    pub notify_capacity: usize,
    /// Maximum records returned by `ListDetections`.
    pub list_limit: usize,
    /// Register on the session bus instead of the system bus.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `LOOKOUT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("lookout");

        let db_path = std::env::var("LOOKOUT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("detections.db"));

        Self {
            db_path,
            cooldown_secs: clamp_cooldown(env_i64("LOOKOUT_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS)),
            similarity_threshold: checked_threshold(env_f32(
                "LOOKOUT_SIMILARITY_THRESHOLD",
                DEFAULT_THRESHOLD,
            )),
            notify_capacity: env_usize("LOOKOUT_NOTIFY_CAPACITY", 256).max(1),
            list_limit: env_usize("LOOKOUT_LIST_LIMIT", 100),
            session_bus: std::env::var("LOOKOUT_SESSION_BUS")
                .map(|v| v != "0")
                .unwrap_or(false),
        }
    }

    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(clamp_cooldown(self.cooldown_secs))
    }
}

// TimeDelta holds milliseconds in an i64.
const MAX_COOLDOWN_SECS: i64 = i64::MAX / 1000;

fn clamp_cooldown(secs: i64) -> i64 {
    secs.clamp(0, MAX_COOLDOWN_SECS)
}

/// A NaN or non-positive threshold would match nothing and silently turn
/// suppression off.
fn checked_threshold(threshold: f32) -> f32 {
    if threshold.is_finite() && threshold > 0.0 {
        return threshold;
    }
    tracing::warn!(
        threshold,
        fallback = DEFAULT_THRESHOLD,
        "invalid similarity threshold; using default"
    );
    DEFAULT_THRESHOLD
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
