//! Failure taxonomy for the Session Engine (§7), classified by the
//! action the engine takes in response rather than by failure type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing project directory, animal in multiple projects,
    /// unsupported session type. Abort before any hardware is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Mesoscope landing zone not empty, required files missing, motor
    /// checksum mismatch, host has too few cores. Bounded-retry / fatal.
    #[error("precondition violation: {0}")]
    Precondition(String),

    /// Unity cue-sequence request timed out, or mesoscope frame triggers
    /// absent beyond the watchdog window and the operator declined
    /// every retry.
    #[error("liveness failure: {0}")]
    Liveness(String),

    /// Operator confirmed an exit via the UI.
    #[error("user-requested abort: {0}")]
    UserAbort(String),

    /// Unexpected failure inside a task loop; shutdown must still run.
    #[error("unexpected task-loop error: {0}")]
    Unexpected(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Error surfaced from the preprocessing pipeline after data capture.
    #[error("preprocessing error: {0}")]
    Preprocessing(String),

    #[error(transparent)]
    Config(#[from] mesoscope_common::error::ConfigError),

    #[error(transparent)]
    Hal(#[from] mesoscope_hal::HalError),

    #[error(transparent)]
    Shm(#[from] mesoscope_shm::ShmError),

    #[error(transparent)]
    Unity(#[from] mesoscope_unity::UnityError),
}

pub type EngineResult<T> = Result<T, EngineError>;
