//! Per-interface contracts (§4.2): one module per hardware module type.

pub mod brake;
pub mod encoder;
pub mod lick;
pub mod screen;
pub mod torque;
pub mod ttl;
pub mod valve;

pub use brake::BrakeInterface;
pub use encoder::EncoderInterface;
pub use lick::LickInterface;
pub use screen::ScreenInterface;
pub use torque::TorqueInterface;
pub use ttl::TtlInterface;
pub use valve::ValveInterface;
