//! Engine-local mutable state (§3 "Engine-local mutable state"). Owned
//! exclusively by the engine's single thread; no locking needed since
//! nothing outside the engine ever touches these fields directly (they
//! only observe effects through trackers and the control vector).

use mesoscope_common::state::SystemState;

/// Guidance ("must-lick") bookkeeping (§4.8.a, glossary "Guidance").
#[derive(Debug, Clone, Copy, Default)]
pub struct GuidanceState {
    pub enabled: bool,
    pub show_boundary: bool,
}

/// Everything the runtime cycle reads and writes across calls (§3).
pub struct EngineState {
    // System state, stored as two u8 codes per §3 ("stored in the
    // engine as two u8s: current + pre-pause").
    pub system_state: SystemState,
    pub pre_pause_system_state: SystemState,
    pub runtime_state: u8,

    // Cached tracker reads (§4.8.a).
    pub last_distance_cm: f64,
    pub last_position_unity: f64,
    pub last_speed_sample_us: u64,
    pub running_speed_cm_s: f64,

    pub last_lick_count: u64,

    // Volume accounting (§4.8.a, §4.8.e).
    pub delivered_water_ul: f64,
    pub paused_water_ul: f64,
    pub unconsumed_reward_count: u32,

    // Unity/trial bookkeeping (§4.8.a).
    pub guidance: GuidanceState,
    pub completed_trials: usize,
    pub failed_trials: u32,
    pub guided_trials_remaining: u32,
    pub failed_threshold: u32,
    pub recovery_trials: u32,
    pub trial_rewarded: bool,

    // Lifecycle flags.
    pub paused: bool,
    pub unity_terminated: bool,
    pub mesoscope_terminated: bool,
    pub terminated: bool,

    // Pause-time accounting (§4.8.b).
    pub paused_time_s: f64,
    pub pause_start_us: Option<u64>,

    // Mesoscope watchdog (§4.8.d).
    pub last_mesoscope_pulses: u64,
    pub last_mesoscope_check_us: u64,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            system_state: SystemState::Idle,
            pre_pause_system_state: SystemState::Idle,
            runtime_state: 0,
            last_distance_cm: 0.0,
            last_position_unity: 0.0,
            last_speed_sample_us: 0,
            running_speed_cm_s: 0.0,
            last_lick_count: 0,
            delivered_water_ul: 0.0,
            paused_water_ul: 0.0,
            unconsumed_reward_count: 0,
            guidance: GuidanceState::default(),
            completed_trials: 0,
            failed_trials: 0,
            guided_trials_remaining: 0,
            failed_threshold: 0,
            recovery_trials: 0,
            trial_rewarded: false,
            paused: false,
            unity_terminated: false,
            mesoscope_terminated: false,
            terminated: false,
            paused_time_s: 0.0,
            pause_start_us: None,
            last_mesoscope_pulses: 0,
            last_mesoscope_check_us: 0,
        }
    }

    /// `setup_lick_guidance(initial_guided, failed_threshold, recovery_guided)`
    /// (§4.9 Experiment): resets the per-state guidance counters. The
    /// source's `setup_lick_guidance` does reset `guided_trials_remaining`
    /// (§9 Open Question, resolved in favor of the source's behavior).
    pub fn setup_lick_guidance(&mut self, initial_guided: u32, failed_threshold: u32, recovery_guided: u32) {
        self.guided_trials_remaining = initial_guided;
        self.failed_threshold = failed_threshold;
        self.recovery_trials = recovery_guided;
        self.failed_trials = 0;
        self.guidance.enabled = initial_guided > 0;
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}
