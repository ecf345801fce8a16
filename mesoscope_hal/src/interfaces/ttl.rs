//! TTLInterface (type 1, §4.2). Multiple instances run per session,
//! each with its own module id (e.g. the mesoscope frame-trigger line).

use crate::module_interface::{Command, ModuleInterface};
use mesoscope_common::consts::{event, module_type};
use mesoscope_shm::MesoscopePulseTracker;
use std::sync::Arc;

const EXPECTED_EVENTS: [u8; 4] = [
    event::TTL_INPUT_HIGH,
    event::TTL_INPUT_LOW,
    event::TTL_OUTPUT_HIGH,
    event::TTL_OUTPUT_LOW,
];

pub struct TtlInterface {
    module_id: u8,
    /// Set when this instance is configured as a pulse reporter (§4.2),
    /// e.g. the mesoscope scan-frame trigger line.
    tracker: Option<Arc<MesoscopePulseTracker>>,
}

impl TtlInterface {
    pub fn new(module_id: u8, pulse_reporter: bool) -> Self {
        Self {
            module_id,
            tracker: pulse_reporter.then(MesoscopePulseTracker::handle),
        }
    }

    pub fn tracker(&self) -> Option<Arc<MesoscopePulseTracker>> {
        self.tracker.as_ref().map(Arc::clone)
    }

    pub fn send_pulse(&self) -> Command {
        Command::OneOff { code: 1, payload: Vec::new(), noblock: true }
    }

    pub fn toggle(&self, state: bool) -> Command {
        Command::OneOff { code: if state { 2 } else { 3 }, payload: Vec::new(), noblock: true }
    }

    pub fn check_state(&self, cycle_us: u64) -> Command {
        Command::Repeated { code: 4, payload: Vec::new(), noblock: true, cycle_us }
    }

    pub fn reset_pulse_count(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.reset();
        }
    }
}

impl ModuleInterface for TtlInterface {
    fn module_type(&self) -> u8 {
        module_type::TTL
    }

    fn module_id(&self) -> u8 {
        self.module_id
    }

    fn expected_events(&self) -> &'static [u8] {
        &EXPECTED_EVENTS
    }

    fn initial_parameters(&self) -> Command {
        Command::SetParameters(Vec::new())
    }

    /// Pulse reporters increment strictly on the rising edge, code 52,
    /// never on the falling edge (§F supplement, resolving §4.2's
    /// implicit wording).
    fn handle_event(&self, event_code: u8, _payload: &[u8], _t_us: u64) {
        if event_code == event::TTL_INPUT_HIGH {
            if let Some(tracker) = &self.tracker {
                tracker.increment();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_reporter_counts_rising_edges_only() {
        let iface = TtlInterface::new(9, true);
        iface.handle_event(event::TTL_INPUT_HIGH, &[], 0);
        iface.handle_event(event::TTL_INPUT_LOW, &[], 0);
        iface.handle_event(event::TTL_INPUT_HIGH, &[], 0);
        assert_eq!(iface.tracker().unwrap().load(), 2);
    }

    #[test]
    fn non_reporter_has_no_tracker() {
        let iface = TtlInterface::new(9, false);
        iface.handle_event(event::TTL_INPUT_HIGH, &[], 0);
        assert!(iface.tracker().is_none());
    }
}
