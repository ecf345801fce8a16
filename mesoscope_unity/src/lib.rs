//! Unity Bridge (§4.5) and Cue→Trial Decomposer (§4.7) for the
//! Mesoscope-VR session runtime.
//!
//! # Module Structure
//!
//! - [`error`] - `UnityError`, `DecomposeError`
//! - [`topics`] - the fixed MQTT topic table
//! - [`payloads`] - JSON payload shapes
//! - [`bridge`] - `UnityBridge`, the MQTT client
//! - [`decomposer`] - the pure cue/trial decomposition function

pub mod bridge;
pub mod decomposer;
pub mod error;
pub mod payloads;
pub mod topics;

pub use bridge::UnityBridge;
pub use decomposer::decompose;
pub use error::{DecomposeError, UnityError, UnityResult};
