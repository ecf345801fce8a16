//! TorqueInterface (type 6, §4.2). No tracker; events are logged only.

use crate::module_interface::{Command, ModuleInterface};
use mesoscope_common::consts::{module_type, G_CM_TO_N_CM};

const EXPECTED_EVENTS: [u8; 0] = [];

pub struct TorqueInterface {
    module_id: u8,
    baseline_adc: u16,
    max_adc: u16,
    sensor_capacity_g_cm: f64,
    polling_us: u64,
    pub torque_n_cm_per_adc: f64,
}

impl TorqueInterface {
    pub fn new(
        module_id: u8,
        baseline_adc: u16,
        max_adc: u16,
        sensor_capacity_g_cm: f64,
        polling_us: u64,
    ) -> Self {
        let torque_n_cm_per_adc = sensor_capacity_g_cm * G_CM_TO_N_CM
            / (max_adc as f64 - baseline_adc as f64);
        Self {
            module_id,
            baseline_adc,
            max_adc,
            sensor_capacity_g_cm,
            polling_us,
            torque_n_cm_per_adc,
        }
    }
}

impl ModuleInterface for TorqueInterface {
    fn module_type(&self) -> u8 {
        module_type::TORQUE
    }

    fn module_id(&self) -> u8 {
        self.module_id
    }

    fn expected_events(&self) -> &'static [u8] {
        &EXPECTED_EVENTS
    }

    fn initial_parameters(&self) -> Command {
        let mut payload = Vec::with_capacity(18);
        payload.extend_from_slice(&self.baseline_adc.to_le_bytes());
        payload.extend_from_slice(&self.max_adc.to_le_bytes());
        payload.extend_from_slice(&self.sensor_capacity_g_cm.to_le_bytes());
        payload.extend_from_slice(&self.polling_us.to_le_bytes());
        Command::SetParameters(payload)
    }

    fn handle_event(&self, _event_code: u8, _payload: &[u8], _t_us: u64) {
        // Logged by the owning channel; no tracker state to mutate.
    }

    fn enable_monitoring(&self) -> Vec<Command> {
        vec![Command::Repeated {
            code: 0,
            payload: Vec::new(),
            noblock: true,
            cycle_us: self.polling_us,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torque_per_adc_matches_formula() {
        let iface = TorqueInterface::new(1, 100, 900, 500.0, 1000);
        let expected = 500.0 * G_CM_TO_N_CM / 800.0;
        assert!((iface.torque_n_cm_per_adc - expected).abs() < 1e-12);
    }
}
