//! ScreenInterface (type 7, §4.2). A single toggle pulse momentarily
//! shorts the display panel's power button through a relay; there is
//! no feedback line, so the engine tracks displayed state against an
//! initial-on flag taken from configuration.

use crate::module_interface::{Command, ModuleInterface};
use mesoscope_common::consts::module_type;
use std::sync::atomic::{AtomicBool, Ordering};

const EXPECTED_EVENTS: [u8; 0] = [];

pub struct ScreenInterface {
    module_id: u8,
    pulse_duration_us: u64,
    displayed: AtomicBool,
}

impl ScreenInterface {
    pub fn new(module_id: u8, pulse_duration_us: u64, initially_on: bool) -> Self {
        Self {
            module_id,
            pulse_duration_us,
            displayed: AtomicBool::new(initially_on),
        }
    }

    pub fn is_displayed(&self) -> bool {
        self.displayed.load(Ordering::Acquire)
    }

    /// `set_state(bool)` (§4.2): a single toggle pulse. The engine's
    /// locally tracked `displayed` flag flips optimistically since the
    /// relay has no feedback line.
    pub fn set_state(&self, displayed: bool) -> Command {
        self.displayed.store(displayed, Ordering::Release);
        Command::OneOff {
            code: 1,
            payload: self.pulse_duration_us.to_le_bytes().to_vec(),
            noblock: true,
        }
    }
}

impl ModuleInterface for ScreenInterface {
    fn module_type(&self) -> u8 {
        module_type::SCREEN
    }

    fn module_id(&self) -> u8 {
        self.module_id
    }

    fn expected_events(&self) -> &'static [u8] {
        &EXPECTED_EVENTS
    }

    fn initial_parameters(&self) -> Command {
        Command::SetParameters(self.pulse_duration_us.to_le_bytes().to_vec())
    }

    fn handle_event(&self, _event_code: u8, _payload: &[u8], _t_us: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_state_flips_tracked_flag() {
        let iface = ScreenInterface::new(1, 500, true);
        assert!(iface.is_displayed());
        iface.set_state(false);
        assert!(!iface.is_displayed());
    }
}
