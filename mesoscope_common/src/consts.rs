//! System-wide constants for the Mesoscope-VR workspace.
//!
//! Single source of truth for log-record codes, module type/event codes,
//! and timing budgets shared across crates.

/// Minimum logical cores required to run a session (§4.8 step 1:
/// 3 channels, 1 log bus, 4 video, 1 engine, 1 UI).
pub const MIN_LOGICAL_CORES: usize = 10;

/// Log record code: `[SYSTEM_STATE, code]`.
pub const LOG_SYSTEM_STATE: u8 = 1;
/// Log record code: `[RUNTIME_STATE, code]`.
pub const LOG_RUNTIME_STATE: u8 = 2;
/// Log record code: `[GUIDANCE_STATE, code]`.
pub const LOG_GUIDANCE_STATE: u8 = 3;
/// Log record code: `[SHOW_REWARD, code]`.
pub const LOG_SHOW_REWARD: u8 = 4;
/// Log record code: `[DISTANCE_SNAPSHOT, f64-le]`.
pub const LOG_DISTANCE_SNAPSHOT: u8 = 5;

/// Log source id reserved for the engine's own control records.
pub const LOG_SOURCE_ENGINE: u8 = 1;

/// `runtime_state` value written when entering `Idle`.
pub const RUNTIME_STATE_IDLE: u8 = 0;
/// `runtime_state` value written when entering LickTraining/RunTraining.
pub const RUNTIME_STATE_ACTIVE: u8 = 255;

/// Module type ids (§4.2).
pub mod module_type {
    pub const TTL: u8 = 1;
    pub const ENCODER: u8 = 2;
    pub const BRAKE: u8 = 3;
    pub const LICK: u8 = 4;
    pub const VALVE: u8 = 5;
    pub const TORQUE: u8 = 6;
    pub const SCREEN: u8 = 7;
}

/// Inbound event codes shared by module interfaces (§4.2).
pub mod event {
    /// EncoderInterface: CCW-rotated.
    pub const ENCODER_CCW: u8 = 51;
    /// EncoderInterface: CW-rotated.
    pub const ENCODER_CW: u8 = 52;
    /// EncoderInterface: PPR-report.
    pub const ENCODER_PPR_REPORT: u8 = 53;

    /// LickInterface: ADC reading report.
    pub const LICK_ADC_READING: u8 = 51;

    /// ValveInterface: Open.
    pub const VALVE_OPEN: u8 = 52;
    /// ValveInterface: Closed.
    pub const VALVE_CLOSED: u8 = 53;
    /// ValveInterface: CalibrationDone.
    pub const VALVE_CALIBRATION_DONE: u8 = 54;

    /// TTLInterface: InputHigh.
    pub const TTL_INPUT_HIGH: u8 = 52;
    /// TTLInterface: InputLow.
    pub const TTL_INPUT_LOW: u8 = 53;
    /// TTLInterface: OutputHigh.
    pub const TTL_OUTPUT_HIGH: u8 = 55;
    /// TTLInterface: OutputLow.
    pub const TTL_OUTPUT_LOW: u8 = 56;
}

/// Mesoscope-frame watchdog trip delay (§4.8.d): 300 ms.
pub const MESOSCOPE_FRAME_DELAY_MS: u64 = 300;

/// `start_mesoscope` per-attempt pulse-poll timeout: 5 s.
pub const MESOSCOPE_START_POLL_S: u64 = 5;
/// Minimum pulses observed within the poll window to consider the
/// mesoscope armed.
pub const MESOSCOPE_START_MIN_PULSES: u64 = 10;
/// Number of declined operator retries before `start_mesoscope` aborts fatally.
pub const MESOSCOPE_START_MAX_DECLINED_RETRIES: u32 = 5;

/// Unity cue-sequence request timeout: 10 s (fatal on expiry).
pub const CUE_SEQUENCE_TIMEOUT_S: u64 = 10;

/// Data-cycle running-speed sampling interval: 50 ms.
pub const SPEED_SAMPLE_INTERVAL_MS: u64 = 50;

/// Run-training speed threshold clamp range [cm/s].
pub const SPEED_THRESHOLD_MIN_CM_S: f64 = 0.1;
pub const SPEED_THRESHOLD_MAX_CM_S: f64 = 5.0;
/// Run-training duration threshold clamp range [ms].
pub const DURATION_THRESHOLD_MIN_MS: f64 = 50.0;
pub const DURATION_THRESHOLD_MAX_MS: f64 = 5000.0;

/// Valve reference-calibration run: 200 pulses at 5 uL.
pub const VALVE_REFERENCE_PULSE_COUNT: u32 = 200;
pub const VALVE_REFERENCE_VOLUME_UL: f64 = 5.0;
/// Floor duration [us] used when evaluating the smallest reliably
/// dispensable volume.
pub const VALVE_MIN_DURATION_US: f64 = 10.0;

/// Lick-training per-reward volume [uL].
pub const LICK_TRAINING_REWARD_UL: f64 = 5.0;
/// Run-training per-reward volume [uL].
pub const RUN_TRAINING_REWARD_UL: f64 = 5.0;

/// Gravitational constant used to convert g*cm torque specs to N*cm.
pub const G_CM_TO_N_CM: f64 = 0.00981;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(MIN_LOGICAL_CORES >= 10);
        assert!(SPEED_THRESHOLD_MIN_CM_S < SPEED_THRESHOLD_MAX_CM_S);
        assert!(DURATION_THRESHOLD_MIN_MS < DURATION_THRESHOLD_MAX_MS);
        assert_ne!(RUNTIME_STATE_IDLE, RUNTIME_STATE_ACTIVE);
    }
}
