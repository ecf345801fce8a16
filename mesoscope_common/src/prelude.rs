//! Prelude module for common re-exports.
//!
//! Lets consumers do `use mesoscope_common::prelude::*;` and get the
//! most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use mesoscope_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigLoader, LogLevel, SystemConfiguration};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{ConfigError, SessionError};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::*;

// ─── System state ───────────────────────────────────────────────────
pub use crate::state::SystemState;

// ─── Session identity and layout ────────────────────────────────────
pub use crate::filesystem::{FilesystemLayout, SystemRoots};
pub use crate::identity::{SessionIdentity, SessionType};

// ─── Session data ───────────────────────────────────────────────────
pub use crate::descriptor::{
    DescriptorCore, ExperimentState, SessionDescriptor, TrialDefinition, TrialStructure,
    NOTES_PLACEHOLDER,
};
pub use crate::hardware_state::HardwareState;
pub use crate::positions::{MesoscopePositions, ZaberPositions};
