use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Playback state owned by the player orchestrator.
///
/// Exactly one value exists per player; worker threads and callers observe it
/// through the published state, never through shared fields of their own.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No audio has been loaded yet (initial state, no decoder).
    #[default]
    Idle,
    /// Frames are being written to the output device.
    Playing,
    /// Playing, but the frame queue is starved; waiting for the decoder.
    Buffering,
    /// Playback is suspended; the decode stage keeps producing.
    Paused,
    /// Playback is not running. Audio may still be loaded.
    Stopped,
}

/// Severity of a [`PlayerLog`] record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// A log record published by the player alongside its tracing output.
///
/// Background-thread failures surface as these records (and as state
/// transitions) rather than as errors raised across the thread boundary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerLog {
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch at creation time.
    pub timestamp_ms: u64,
}

impl PlayerLog {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp_ms: epoch_ms(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

impl fmt::Display for PlayerLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Snapshot of player state suitable for UIs and status APIs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    /// Current playback state.
    pub state: PlaybackState,
    /// Whether audio is loaded and ready for playback.
    pub loaded: bool,
    /// Current playback position in milliseconds.
    pub position_ms: u64,
    /// Total stream duration in milliseconds, when known.
    pub duration_ms: Option<u64>,
    /// Current volume in `[0.0, 1.0]`.
    pub volume: f32,
    /// Source sample rate (Hz), when loaded.
    pub sample_rate: Option<u32>,
    /// Source channel count, when loaded.
    pub channels: Option<u32>,
}

impl PlayerStatus {
    /// Current playback position as a `Duration`.
    pub fn position(&self) -> Duration {
        Duration::from_millis(self.position_ms)
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_millis(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_constructors_set_level() {
        assert_eq!(PlayerLog::info("a").level, LogLevel::Info);
        assert_eq!(PlayerLog::warning("b").level, LogLevel::Warning);
        assert_eq!(PlayerLog::error("c").level, LogLevel::Error);
    }

    #[test]
    fn log_records_creation_time() {
        let log = PlayerLog::info("timed");
        assert!(log.timestamp_ms > 0);
    }

    #[test]
    fn log_display_includes_level_and_message() {
        let log = PlayerLog::warning("queue starved");
        assert_eq!(log.to_string(), "[WARNING] queue starved");
    }

    #[test]
    fn default_status_is_idle_and_unloaded() {
        let status = PlayerStatus::default();
        assert_eq!(status.state, PlaybackState::Idle);
        assert!(!status.loaded);
        assert_eq!(status.position(), Duration::ZERO);
    }
}
