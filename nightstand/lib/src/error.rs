//! Error types for the nightstand library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by alarm scheduling operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AlarmError {
    /// The requested wake time is not in the future.
    #[error("alarm time {trigger_at_millis} is not after now ({now_millis})")]
    InvalidTime {
        trigger_at_millis: i64,
        now_millis: i64,
    },

    /// Exact alarms are not permitted on this device.
    #[error("exact alarms are not permitted")]
    PermissionDenied,

    /// A snooze interval that cannot produce a future alarm.
    #[error("snooze interval must be positive (got {interval_millis} ms)")]
    InvalidSnoozeInterval { interval_millis: i64 },

    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reading or writing the persisted alarm failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The timer service refused or lost the request.
    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Errors that can occur when working with alarm storage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Failed to read or write the alarm file.
    #[error("failed to access alarm store: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the alarm file.
    #[error("failed to parse alarm store: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to acquire a file lock.
    #[error("failed to acquire lock on {}", path.display())]
    Lock { path: PathBuf },

    /// The alarm file was written by an incompatible version.
    #[error("alarm store version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },

    /// The blocking file task panicked or was cancelled.
    #[error("alarm store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors returned by an exact timer port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimerError {
    /// Nobody is listening for fired alarms.
    #[error("timer service unavailable: {0}")]
    Unavailable(String),

    /// The timer service refused the request.
    #[error("timer request rejected: {0}")]
    Rejected(String),
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the config file.
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A config value or environment override is out of range.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
