//! Mesoscope-VR Shared Memory
//!
//! Cross-thread and cross-process state shared across the session
//! runtime: per-interface trackers (in-process `Arc<Atomic*>` handles,
//! one writer each), the Clock & Log Bus, and the UI control vector
//! (real cross-process shared memory, since the control GUI runs in
//! its own process).
//!
//! # Module Structure
//!
//! - [`error`] - `ShmError`
//! - [`platform`] - Linux mmap creation/attachment helpers
//! - [`tracker`] - `EncoderTracker`, `LickTracker`, `ValveTracker`, `MesoscopePulseTracker`
//! - [`control_vector`] - the UI's shared integer control vector
//! - [`log_bus`] - `LogBus`, `LogBusHandle`

pub mod control_vector;
pub mod error;
pub mod log_bus;
pub mod platform;
pub mod tracker;

pub use control_vector::ControlVector;
pub use error::{ShmError, ShmResult};
pub use log_bus::{LogBus, LogBusHandle};
pub use tracker::{EncoderTracker, LickTracker, MesoscopePulseTracker, ValveTracker};
