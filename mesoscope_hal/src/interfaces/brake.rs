//! BrakeInterface (type 3, §4.2).

use crate::module_interface::{Command, ModuleInterface};
use mesoscope_common::consts::{module_type, G_CM_TO_N_CM};
use std::sync::atomic::{AtomicU8, Ordering};

const EXPECTED_EVENTS: [u8; 0] = [];

pub struct BrakeInterface {
    module_id: u8,
    pub min_torque_n_cm: f64,
    pub max_torque_n_cm: f64,
    pub torque_per_pwm: f64,
    pub force_per_pwm: f64,
    last_pwm: AtomicU8,
}

impl BrakeInterface {
    pub fn new(module_id: u8, min_torque_g_cm: f64, max_torque_g_cm: f64, wheel_diameter_cm: f64) -> Self {
        let min_torque_n_cm = min_torque_g_cm * G_CM_TO_N_CM;
        let max_torque_n_cm = max_torque_g_cm * G_CM_TO_N_CM;
        let torque_per_pwm = (max_torque_n_cm - min_torque_n_cm) / 255.0;
        let force_per_pwm = torque_per_pwm / (wheel_diameter_cm / 2.0);
        Self {
            module_id,
            min_torque_n_cm,
            max_torque_n_cm,
            torque_per_pwm,
            force_per_pwm,
            last_pwm: AtomicU8::new(0),
        }
    }

    /// `set_state(bool)` (§4.2): engages/disengages at the configured
    /// torque extremes.
    pub fn set_state(&self, engaged: bool) -> Command {
        let pwm: u8 = if engaged { 255 } else { 0 };
        self.last_pwm.store(pwm, Ordering::Release);
        Command::OneOff { code: 1, payload: vec![pwm], noblock: true }
    }

    /// Records the PWM value from a `set_parameters(pwm)` command so
    /// `set_breaking_power()` can replay it.
    pub fn set_parameters(&self, pwm: u8) -> Command {
        self.last_pwm.store(pwm, Ordering::Release);
        Command::SetParameters(vec![pwm])
    }

    /// `set_breaking_power()` (§4.2): activates variable-PWM mode at
    /// the last `set_parameters(pwm)` value.
    pub fn set_breaking_power(&self) -> Command {
        let pwm = self.last_pwm.load(Ordering::Acquire);
        Command::OneOff { code: 2, payload: vec![pwm], noblock: true }
    }
}

impl ModuleInterface for BrakeInterface {
    fn module_type(&self) -> u8 {
        module_type::BRAKE
    }

    fn module_id(&self) -> u8 {
        self.module_id
    }

    fn expected_events(&self) -> &'static [u8] {
        &EXPECTED_EVENTS
    }

    fn initial_parameters(&self) -> Command {
        Command::SetParameters(vec![self.last_pwm.load(Ordering::Acquire)])
    }

    fn handle_event(&self, _event_code: u8, _payload: &[u8], _t_us: u64) {
        // BrakeInterface has no inbound events and no tracker (§4.2).
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precomputed_slopes_match_formula() {
        let b = BrakeInterface::new(1, 0.0, 35_000.0, 15.0);
        let expected_torque_per_pwm = (35_000.0 * G_CM_TO_N_CM) / 255.0;
        assert!((b.torque_per_pwm - expected_torque_per_pwm).abs() < 1e-9);
        assert!((b.force_per_pwm - expected_torque_per_pwm / 7.5).abs() < 1e-9);
    }

    #[test]
    fn breaking_power_replays_last_parameters() {
        let b = BrakeInterface::new(1, 0.0, 35_000.0, 15.0);
        b.set_parameters(128);
        let cmd = b.set_breaking_power();
        assert_eq!(cmd, Command::OneOff { code: 2, payload: vec![128], noblock: true });
    }
}
