//! Experiment controller (§4.9 "Experiment").

use crate::cycle::{runtime_cycle, set_system_state, RuntimeContext};
use crate::error::EngineResult;
use mesoscope_common::descriptor::ExperimentState;

/// Runs the ordered experiment-state sequence to completion against an
/// already started [`RuntimeContext`]. `states` is the parsed content of
/// `experiment_configuration.yaml` (§6).
pub fn run(ctx: &mut RuntimeContext<'_>, states: &[ExperimentState]) -> EngineResult<()> {
    for experiment_state in states {
        // `runtime_state` is forced to the phase's own code; Rest/Run
        // have no forced value of their own (§4.8.f), so the code set
        // here survives the `set_system_state` call below.
        ctx.state.runtime_state = experiment_state.state_code;
        set_system_state(ctx.state, ctx.hardware, ctx.log, experiment_state.system_state)?;
        ctx.state.setup_lick_guidance(
            experiment_state.initial_guided_trials,
            experiment_state.failed_threshold,
            experiment_state.recovery_guided_trials,
        );

        let phase_start_us = ctx.log.now_us();
        loop {
            runtime_cycle(ctx)?;
            if ctx.state.terminated {
                return Ok(());
            }
            let elapsed_us = ctx.log.now_us().saturating_sub(phase_start_us);
            let paused_us = (ctx.state.paused_time_s * 1_000_000.0) as u64;
            if elapsed_us.saturating_sub(paused_us) >= (experiment_state.duration_s * 1_000_000.0) as u64 {
                break;
            }
        }
        ctx.state.paused_time_s = 0.0;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesoscope_common::state::SystemState;

    #[test]
    fn experiment_states_carry_their_own_runtime_code() {
        let states = vec![
            ExperimentState {
                state_code: 1,
                system_state: SystemState::Rest,
                duration_s: 5.0,
                initial_guided_trials: 0,
                failed_threshold: 3,
                recovery_guided_trials: 0,
            },
            ExperimentState {
                state_code: 2,
                system_state: SystemState::Run,
                duration_s: 300.0,
                initial_guided_trials: 5,
                failed_threshold: 3,
                recovery_guided_trials: 2,
            },
        ];
        assert_eq!(states[0].system_state.forced_runtime_state(), None);
        assert_eq!(states[1].system_state.forced_runtime_state(), None);
        assert_eq!(states[1].state_code, 2);
    }
}
