//! Module Interfaces, Microcontroller Channels, Motor Group, and Video
//! Subsystem for the Mesoscope-VR session runtime (§4.2–§4.4, §2
//! item 4).
//!
//! # Module Structure
//!
//! - [`error`] - `HalError`
//! - [`frame`] - framed byte protocol, `Transport` trait
//! - [`simulation`] - in-memory `Transport` standing in for hardware
//! - [`module_interface`] - the common `ModuleInterface` contract and `Command`
//! - [`interfaces`] - Encoder/Lick/Valve/Brake/TTL/Torque/Screen interfaces
//! - [`channel`] - microcontroller channel threads (Actor/Sensor/Encoder)
//! - [`motor_group`] - the Zaber daisy-chain Motor Group
//! - [`video`] - camera pipelines (producer/encoder threads)

pub mod channel;
pub mod error;
pub mod frame;
pub mod interfaces;
pub mod module_interface;
pub mod motor_group;
pub mod simulation;
pub mod video;

pub use channel::{spawn_channel, ChannelHandle, ChannelKind};
pub use error::{HalError, HalResult};
pub use module_interface::{Command, ModuleInterface};
pub use motor_group::{Axis, AxisTargets, MotorGroup, SimulatedAxis};
pub use video::{CameraPipeline, FrameSource, VideoSubsystem};
