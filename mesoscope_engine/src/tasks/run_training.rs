//! Run training controller (§4.9 "Run training").

use crate::cycle::{resolve_reward, runtime_cycle, set_system_state, RuntimeContext};
use crate::error::EngineResult;
use crate::sink::VisualizerUpdate;
use mesoscope_common::consts::{
    DURATION_THRESHOLD_MAX_MS, DURATION_THRESHOLD_MIN_MS, RUN_TRAINING_REWARD_UL, SPEED_THRESHOLD_MAX_CM_S,
    SPEED_THRESHOLD_MIN_CM_S,
};
use mesoscope_common::descriptor::RunTrainingFields;
use mesoscope_common::state::SystemState;
use mesoscope_shm::control_vector::{IDX_DURATION_MODIFIER, IDX_SPEED_MODIFIER};

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// `(speed_threshold_cm_s, duration_threshold_ms)` for the current
/// escalation step, folding in the UI's live modifiers.
fn thresholds(
    ctx: &RuntimeContext<'_>,
    fields: &RunTrainingFields,
    steps: f64,
) -> EngineResult<(f64, f64)> {
    let speed_modifier = ctx.control.get(IDX_SPEED_MODIFIER)? as f64;
    let duration_modifier = ctx.control.get(IDX_DURATION_MODIFIER)? as f64;
    let speed = clamp(
        fields.initial_speed_threshold_cm_s + steps * fields.speed_step_cm_s + speed_modifier * 0.01,
        SPEED_THRESHOLD_MIN_CM_S,
        SPEED_THRESHOLD_MAX_CM_S,
    );
    let duration = clamp(
        fields.initial_duration_threshold_ms + steps * fields.duration_step_ms + duration_modifier * 10.0,
        DURATION_THRESHOLD_MIN_MS,
        DURATION_THRESHOLD_MAX_MS,
    );
    Ok((speed, duration))
}

/// Runs run-training to completion against an already started
/// [`RuntimeContext`].
pub fn run(ctx: &mut RuntimeContext<'_>, fields: &RunTrainingFields) -> EngineResult<()> {
    set_system_state(ctx.state, ctx.hardware, ctx.log, SystemState::RunTraining)?;

    let training_start_us = ctx.log.now_us();
    let mut last_pushed_speed: Option<f64> = None;
    let mut last_pushed_duration: Option<f64> = None;

    // Continuous-above-threshold bookkeeping: `above_since_us` marks
    // the start of the current qualifying streak; `dip_since_us` marks
    // the start of a single tolerated sub-threshold excursion within it.
    let mut above_since_us: Option<u64> = None;
    let mut dip_since_us: Option<u64> = None;

    loop {
        runtime_cycle(ctx)?;
        if ctx.state.terminated {
            return Ok(());
        }

        let steps = (ctx.state.delivered_water_ul / fields.increase_threshold_ul).floor();
        let (speed_threshold, duration_threshold) = thresholds(ctx, fields, steps)?;
        if last_pushed_speed != Some(speed_threshold) {
            ctx.visualizer.push(VisualizerUpdate::SpeedThreshold(speed_threshold));
            last_pushed_speed = Some(speed_threshold);
        }
        if last_pushed_duration != Some(duration_threshold) {
            ctx.visualizer.push(VisualizerUpdate::DurationThreshold(duration_threshold));
            last_pushed_duration = Some(duration_threshold);
        }

        let now_us = ctx.log.now_us();
        if ctx.state.running_speed_cm_s >= speed_threshold {
            if dip_since_us.is_some() {
                dip_since_us = None;
            }
            let since = *above_since_us.get_or_insert(now_us);
            if now_us.saturating_sub(since) >= (duration_threshold * 1000.0) as u64 {
                resolve_reward(ctx, RUN_TRAINING_REWARD_UL)?;
                above_since_us = None;
                dip_since_us = None;
            }
        } else if above_since_us.is_some() {
            match dip_since_us {
                None => dip_since_us = Some(now_us),
                Some(dip_start) => {
                    if now_us.saturating_sub(dip_start) >= (fields.max_idle_time_ms * 1000.0) as u64 {
                        above_since_us = None;
                        dip_since_us = None;
                    }
                }
            }
        }

        let elapsed_s = now_us.saturating_sub(training_start_us).saturating_sub(
            (ctx.state.paused_time_s * 1_000_000.0) as u64,
        ) as f64
            / 1_000_000.0;
        if elapsed_s >= fields.max_time_s || ctx.state.delivered_water_ul >= fields.max_volume_ml * 1000.0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_both_bounds() {
        assert_eq!(clamp(-1.0, 0.1, 5.0), 0.1);
        assert_eq!(clamp(10.0, 0.1, 5.0), 5.0);
        assert_eq!(clamp(2.0, 0.1, 5.0), 2.0);
    }

    #[test]
    fn speed_escalation_matches_seed_scenario_s3() {
        // S3: initial_speed=1.0, speed_step=0.1, 4 steps of 10 uL each
        // out of 40 uL delivered -> speed_threshold = 1.4 cm/s,
        // duration_threshold = 1400 ms, with zero UI modifiers.
        let fields = RunTrainingFields {
            initial_speed_threshold_cm_s: 1.0,
            initial_duration_threshold_ms: 1000.0,
            speed_step_cm_s: 0.1,
            duration_step_ms: 100.0,
            increase_threshold_ul: 10.0,
            max_volume_ml: 0.05,
            max_time_s: 300.0,
            max_idle_time_ms: 500.0,
        };
        let steps = (40.0_f64 / fields.increase_threshold_ul).floor();
        let speed = clamp(
            fields.initial_speed_threshold_cm_s + steps * fields.speed_step_cm_s,
            SPEED_THRESHOLD_MIN_CM_S,
            SPEED_THRESHOLD_MAX_CM_S,
        );
        let duration = clamp(
            fields.initial_duration_threshold_ms + steps * fields.duration_step_ms,
            DURATION_THRESHOLD_MIN_MS,
            DURATION_THRESHOLD_MAX_MS,
        );
        assert!((speed - 1.4).abs() < 1e-9);
        assert!((duration - 1400.0).abs() < 1e-9);
    }
}
