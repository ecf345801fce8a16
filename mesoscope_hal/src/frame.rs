//! Framed byte protocol shared by all three microcontroller channels
//! (§4.3). The wire encoding of the frame is intentionally left
//! abstract here — only the message layer is in scope (§1 Non-goals);
//! `Transport` is the seam a real serial/USB backend would implement.

use crate::error::HalResult;

/// One inbound event from a module, tagged with the channel's
/// monotonic microsecond receipt stamp (§4.3: "every frame carries a
/// channel-assigned monotonic microsecond stamp at the point of
/// receipt").
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub module_type: u8,
    pub module_id: u8,
    pub event_code: u8,
    pub payload: Vec<u8>,
    pub t_us: u64,
}

/// One outbound command targeting a module.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    pub module_type: u8,
    pub module_id: u8,
    pub command_code: u8,
    pub payload: Vec<u8>,
}

/// A channel's physical or simulated transport. `mesoscope_hal::simulation`
/// provides the backend used when no hardware is attached.
pub trait Transport: Send {
    fn open(&mut self) -> HalResult<()>;
    fn send_reset(&mut self) -> HalResult<()>;
    fn send(&mut self, frame: &OutboundFrame) -> HalResult<()>;
    /// Non-blocking poll for the next inbound frame.
    fn try_recv(&mut self) -> HalResult<Option<InboundFrame>>;
    fn close(&mut self) -> HalResult<()>;
}
