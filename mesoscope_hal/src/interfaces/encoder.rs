//! EncoderInterface (type 2, §4.2).

use crate::module_interface::{Command, ModuleInterface};
use mesoscope_common::consts::{event, module_type};
use mesoscope_shm::EncoderTracker;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const EXPECTED_EVENTS: [u8; 3] = [event::ENCODER_CCW, event::ENCODER_CW, event::ENCODER_PPR_REPORT];

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

pub struct EncoderInterface {
    module_id: u8,
    ppr: u32,
    wheel_diameter_cm: f64,
    cm_per_unity_unit: f64,
    polling_delay_us: u64,
    pub cm_per_pulse: f64,
    pub unity_per_pulse: f64,
    tracker: Arc<EncoderTracker>,
    pulse_count: AtomicU64,
}

impl EncoderInterface {
    pub fn new(
        module_id: u8,
        ppr: u32,
        wheel_diameter_cm: f64,
        cm_per_unity_unit: f64,
        polling_delay_us: u64,
    ) -> Self {
        let cm_per_pulse = round8(std::f64::consts::PI * wheel_diameter_cm / ppr as f64);
        let unity_per_pulse = round8(
            (std::f64::consts::PI * wheel_diameter_cm) / (ppr as f64 * cm_per_unity_unit),
        );
        Self {
            module_id,
            ppr,
            wheel_diameter_cm,
            cm_per_unity_unit,
            polling_delay_us,
            cm_per_pulse,
            unity_per_pulse,
            tracker: EncoderTracker::handle(),
            pulse_count: AtomicU64::new(0),
        }
    }

    pub fn tracker(&self) -> Arc<EncoderTracker> {
        Arc::clone(&self.tracker)
    }

    /// `reset_distance_tracker()` (§4.2): zeroes both tracker slots.
    pub fn reset_distance_tracker(&self) {
        self.tracker.reset();
    }

    fn apply_rotation(&self, event_code: u8, payload: &[u8]) {
        if payload.len() < 4 {
            return;
        }
        let k = i32::from_le_bytes(payload[0..4].try_into().unwrap());
        let sign: f64 = if event_code == event::ENCODER_CCW { 1.0 } else { -1.0 };
        self.tracker.distance_cm.fetch_add(k.unsigned_abs() as f64 * self.cm_per_pulse);
        self.tracker
            .position_unity
            .fetch_add(sign * k as f64 * self.unity_per_pulse);
        self.pulse_count.fetch_add(k.unsigned_abs() as u64, Ordering::AcqRel);
    }
}

impl ModuleInterface for EncoderInterface {
    fn module_type(&self) -> u8 {
        module_type::ENCODER
    }

    fn module_id(&self) -> u8 {
        self.module_id
    }

    fn expected_events(&self) -> &'static [u8] {
        &EXPECTED_EVENTS
    }

    fn initial_parameters(&self) -> Command {
        let mut payload = Vec::with_capacity(4 + 8 + 8 + 8);
        payload.extend_from_slice(&self.ppr.to_le_bytes());
        payload.extend_from_slice(&self.wheel_diameter_cm.to_le_bytes());
        payload.extend_from_slice(&self.cm_per_unity_unit.to_le_bytes());
        payload.extend_from_slice(&self.polling_delay_us.to_le_bytes());
        Command::SetParameters(payload)
    }

    fn handle_event(&self, event_code: u8, payload: &[u8], _t_us: u64) {
        if event_code == event::ENCODER_CCW || event_code == event::ENCODER_CW {
            self.apply_rotation(event_code, payload);
        }
        // event::ENCODER_PPR_REPORT carries no tracker-visible state.
    }

    fn enable_monitoring(&self) -> Vec<Command> {
        self.pulse_count.store(0, Ordering::Release);
        vec![Command::Repeated {
            code: 0,
            payload: Vec::new(),
            noblock: true,
            cycle_us: self.polling_delay_us,
        }]
    }

    fn disable_monitoring(&self) -> Vec<Command> {
        vec![Command::ResetQueue]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface() -> EncoderInterface {
        EncoderInterface::new(1, 8192, 15.0, 10.0, 1000)
    }

    #[test]
    fn precomputed_constants_match_formula() {
        let iface = interface();
        let expected_cm = round8(std::f64::consts::PI * 15.0 / 8192.0);
        assert!((iface.cm_per_pulse - expected_cm).abs() < 1e-12);
    }

    #[test]
    fn ccw_is_positive_cw_is_negative() {
        let iface = interface();
        iface.handle_event(event::ENCODER_CCW, &10i32.to_le_bytes(), 0);
        let (dist, pos) = iface.tracker().snapshot();
        assert!(dist > 0.0);
        assert!(pos > 0.0);

        iface.handle_event(event::ENCODER_CW, &10i32.to_le_bytes(), 0);
        let (dist2, pos2) = iface.tracker().snapshot();
        assert!(dist2 > dist, "distance accumulates magnitude regardless of sign");
        assert!(pos2 < pos, "CW rotation must decrease position");
    }

    #[test]
    fn reset_zeroes_both_slots() {
        let iface = interface();
        iface.handle_event(event::ENCODER_CCW, &100i32.to_le_bytes(), 0);
        iface.reset_distance_tracker();
        assert_eq!(iface.tracker().snapshot(), (0.0, 0.0));
    }
}
