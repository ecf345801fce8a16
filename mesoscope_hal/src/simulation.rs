//! Simulated microcontroller transport, standing in for the physical
//! serial/USB channel (§1: transport is specified only at the message
//! layer; actual hardware is out of scope). Used so channels and
//! interfaces are exercisable end-to-end without hardware.

use crate::error::HalResult;
use crate::frame::{InboundFrame, OutboundFrame, Transport};
use std::collections::VecDeque;

/// A scriptable fake transport: inbound frames are injected ahead of
/// time (or by a test), outbound sends are recorded for inspection.
pub struct SimulatedTransport {
    inbound: VecDeque<InboundFrame>,
    sent: Vec<OutboundFrame>,
    open: bool,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self { inbound: VecDeque::new(), sent: Vec::new(), open: false }
    }

    pub fn push_inbound(&mut self, frame: InboundFrame) {
        self.inbound.push_back(frame);
    }

    pub fn sent_frames(&self) -> &[OutboundFrame] {
        &self.sent
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedTransport {
    fn open(&mut self) -> HalResult<()> {
        self.open = true;
        Ok(())
    }

    fn send_reset(&mut self) -> HalResult<()> {
        self.sent.clear();
        Ok(())
    }

    fn send(&mut self, frame: &OutboundFrame) -> HalResult<()> {
        self.sent.push(frame.clone());
        Ok(())
    }

    fn try_recv(&mut self) -> HalResult<Option<InboundFrame>> {
        Ok(self.inbound.pop_front())
    }

    fn close(&mut self) -> HalResult<()> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesoscope_common::consts::{event, module_type};

    #[test]
    fn records_sent_frames_and_replays_inbound_in_order() {
        let mut transport = SimulatedTransport::new();
        transport.open().unwrap();
        transport.push_inbound(InboundFrame {
            module_type: module_type::LICK,
            module_id: 1,
            event_code: event::LICK_ADC_READING,
            payload: vec![0, 0],
            t_us: 10,
        });
        transport
            .send(&OutboundFrame {
                module_type: module_type::LICK,
                module_id: 1,
                command_code: 0,
                payload: vec![],
            })
            .unwrap();
        assert_eq!(transport.sent_frames().len(), 1);
        assert_eq!(transport.try_recv().unwrap().unwrap().t_us, 10);
        assert!(transport.try_recv().unwrap().is_none());
    }
}
