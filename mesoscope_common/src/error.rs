//! Error taxonomy shared across the session runtime (§7).
//!
//! Each crate defines its own error enum for crate-local failure modes;
//! this module holds the taxonomy that's meaningful at the session
//! boundary (config loading, YAML persistence, filesystem layout) so
//! that `mesoscope_engine` can classify failures per §7 without
//! depending on every downstream crate's error type.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration / session-data loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Referenced path does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// TOML parsing failed.
    #[error("failed to parse TOML configuration at {path}: {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// YAML (de)serialization failed.
    #[error("failed to (de)serialize YAML at {path}: {source}")]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Semantic validation failed (e.g. the placeholder notes string was
    /// never replaced by the operator).
    #[error("validation failed for {path}: {reason}")]
    Validation { path: PathBuf, reason: String },

    /// Underlying I/O error while reading/writing a session file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure taxonomy for the session runtime, classified by the action
/// the engine takes in response (§7).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing project directory, animal in multiple projects, unsupported
    /// session type. Abort before any hardware is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Mesoscope landing zone not empty, required files missing, motor
    /// checksum mismatch, host has too few cores. Bounded-retry / fatal.
    #[error("precondition violation: {0}")]
    Precondition(String),

    /// Unity cue-sequence request timed out, or mesoscope frame triggers
    /// absent beyond the watchdog window.
    #[error("liveness failure: {0}")]
    Liveness(String),

    /// Operator confirmed an exit via the UI.
    #[error("user-requested abort: {0}")]
    UserAbort(String),

    /// Unexpected exception inside a task loop; shutdown must still run.
    #[error("unexpected task-loop error: {0}")]
    Unexpected(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Error surfaced from the preprocessing pipeline after data capture.
    #[error("preprocessing error: {0}")]
    Preprocessing(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
