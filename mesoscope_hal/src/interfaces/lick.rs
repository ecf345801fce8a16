//! LickInterface (type 4, §4.2).

use crate::module_interface::{Command, ModuleInterface};
use mesoscope_common::consts::{event, module_type};
use mesoscope_shm::LickTracker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const EXPECTED_EVENTS: [u8; 1] = [event::LICK_ADC_READING];

pub struct LickInterface {
    module_id: u8,
    lick_threshold_adc: u16,
    polling_delay_us: u64,
    tracker: Arc<LickTracker>,
    armed: AtomicBool,
}

impl LickInterface {
    pub fn new(module_id: u8, lick_threshold_adc: u16, polling_delay_us: u64) -> Self {
        Self {
            module_id,
            lick_threshold_adc,
            polling_delay_us,
            tracker: LickTracker::handle(),
            armed: AtomicBool::new(true),
        }
    }

    pub fn tracker(&self) -> Arc<LickTracker> {
        Arc::clone(&self.tracker)
    }
}

impl ModuleInterface for LickInterface {
    fn module_type(&self) -> u8 {
        module_type::LICK
    }

    fn module_id(&self) -> u8 {
        self.module_id
    }

    fn expected_events(&self) -> &'static [u8] {
        &EXPECTED_EVENTS
    }

    fn initial_parameters(&self) -> Command {
        Command::SetParameters(self.lick_threshold_adc.to_le_bytes().to_vec())
    }

    /// Edge rule (§4.2): increments on a reading >= threshold AND the
    /// previous reading was zero; any zero reading re-arms.
    fn handle_event(&self, event_code: u8, payload: &[u8], _t_us: u64) {
        if event_code != event::LICK_ADC_READING || payload.len() < 2 {
            return;
        }
        let reading = u16::from_le_bytes(payload[0..2].try_into().unwrap());
        if reading == 0 {
            self.armed.store(true, Ordering::Release);
            return;
        }
        if reading >= self.lick_threshold_adc && self.armed.swap(false, Ordering::AcqRel) {
            self.tracker.increment();
        }
    }

    fn enable_monitoring(&self) -> Vec<Command> {
        vec![Command::Repeated {
            code: 0,
            payload: Vec::new(),
            noblock: true,
            cycle_us: self.polling_delay_us,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_once_per_rearmed_edge() {
        let iface = LickInterface::new(1, 1800, 1000);
        iface.handle_event(event::LICK_ADC_READING, &0u16.to_le_bytes(), 0);
        iface.handle_event(event::LICK_ADC_READING, &2000u16.to_le_bytes(), 0);
        iface.handle_event(event::LICK_ADC_READING, &2000u16.to_le_bytes(), 0);
        assert_eq!(iface.tracker().load(), 1, "sustained high reading must not double-count");

        iface.handle_event(event::LICK_ADC_READING, &0u16.to_le_bytes(), 0);
        iface.handle_event(event::LICK_ADC_READING, &1900u16.to_le_bytes(), 0);
        assert_eq!(iface.tracker().load(), 2);
    }

    #[test]
    fn below_threshold_never_counts() {
        let iface = LickInterface::new(1, 1800, 1000);
        iface.handle_event(event::LICK_ADC_READING, &0u16.to_le_bytes(), 0);
        iface.handle_event(event::LICK_ADC_READING, &500u16.to_le_bytes(), 0);
        assert_eq!(iface.tracker().load(), 0);
    }
}
