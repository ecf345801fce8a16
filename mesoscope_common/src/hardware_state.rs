//! `HardwareState` snapshot (§3): the calibration constants actually in
//! effect for a session, written once at startup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardwareState {
    /// EncoderInterface `cm_per_pulse`, rounded to 8 decimals (§4.2).
    pub encoder_cm_per_pulse: f64,
    /// EncoderInterface `unity_per_pulse`, rounded to 8 decimals.
    pub encoder_unity_per_pulse: f64,
    /// BrakeInterface minimum torque \[N*cm\].
    pub brake_min_torque_n_cm: f64,
    /// BrakeInterface maximum torque \[N*cm\].
    pub brake_max_torque_n_cm: f64,
    /// LickInterface ADC threshold.
    pub lick_adc_threshold: u16,
    /// ValveInterface power-law scale coefficient `A`.
    pub valve_scale_coefficient: f64,
    /// ValveInterface power-law exponent `B`.
    pub valve_nonlinearity_exponent: f64,
    /// TorqueInterface N*cm per ADC count.
    pub torque_n_cm_per_adc: f64,
    /// Whether the mesoscope TTL monitor recorded at least one pulse
    /// during the last arm attempt.
    pub mesoscope_ttl_recorded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_roundtrip() {
        let snap = HardwareState {
            encoder_cm_per_pulse: 0.0628,
            encoder_unity_per_pulse: 0.0314,
            brake_min_torque_n_cm: 0.0,
            brake_max_torque_n_cm: 343.35,
            lick_adc_threshold: 1800,
            valve_scale_coefficient: 0.002,
            valve_nonlinearity_exponent: 0.9,
            torque_n_cm_per_adc: 0.01,
            mesoscope_ttl_recorded: true,
        };
        let yaml = serde_yaml::to_string(&snap).unwrap();
        let back: HardwareState = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(snap, back);
    }
}
