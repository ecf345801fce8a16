//! Error taxonomy for module interfaces, channels, and the motor group.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    /// Requested a volume below the smallest reliably dispensable
    /// amount (§4.2 ValveInterface, evaluated at a 10us floor).
    #[error("requested volume {volume_ul} uL is below the dispensable floor")]
    VolumeBelowFloor { volume_ul: f64 },

    #[error("axis {axis} is busy")]
    AxisBusy { axis: String },

    #[error("axis {axis} is not connected")]
    AxisNotConnected { axis: String },

    /// Surfaced by a `Transport` implementation on a real hardware
    /// backend; the simulation backend never returns this (§4.2
    /// "Failure semantics": logged as "channel degraded", not fatal).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel's worker thread has already exited; the command was
    /// never sent.
    #[error("channel {channel} is closed")]
    ChannelClosed { channel: String },
}

pub type HalResult<T> = Result<T, HalError>;
