//! Lick training controller (§4.9 "Lick training").

use crate::cycle::{resolve_reward, runtime_cycle, set_system_state, RuntimeContext};
use crate::error::EngineResult;
use mesoscope_common::consts::{LICK_TRAINING_REWARD_UL, SPEED_SAMPLE_INTERVAL_MS};
use mesoscope_common::descriptor::LickTrainingFields;
use mesoscope_common::state::SystemState;
use rand::Rng;
use std::time::Duration;

/// Pre-generates the reward-delay sequence: uniform draws from
/// `[min_delay, max_delay]` until the prefix sum first exceeds the
/// lesser of the time budget and the volume-implied time budget.
fn generate_delay_sequence_s(fields: &LickTrainingFields) -> Vec<f64> {
    let mean_delay_s = (fields.min_reward_delay_s + fields.max_reward_delay_s) / 2.0;
    let reward_count_budget = (fields.max_volume_ml * 1000.0 / LICK_TRAINING_REWARD_UL).floor();
    let volume_budget_s = reward_count_budget * mean_delay_s;
    let time_budget_s = fields.max_time_s.min(volume_budget_s);

    let mut rng = rand::thread_rng();
    let mut delays = Vec::new();
    let mut prefix_s = 0.0;
    while prefix_s <= time_budget_s {
        let delay_s = rng.gen_range(fields.min_reward_delay_s..=fields.max_reward_delay_s);
        prefix_s += delay_s;
        delays.push(delay_s);
    }
    delays
}

/// Runs the lick-training task to completion against an already
/// started [`RuntimeContext`]. The caller (the engine's dispatcher) is
/// responsible for startup and shutdown around this call.
pub fn run(ctx: &mut RuntimeContext<'_>, fields: &LickTrainingFields) -> EngineResult<()> {
    let delays_s = generate_delay_sequence_s(fields);

    // "If max_unconsumed_rewards < 1, disable the cap (set it to
    // sequence length)" — a cap equal to the total scheduled reward
    // count can never trip within this session.
    if ctx.max_unconsumed_rewards < 1 {
        ctx.max_unconsumed_rewards = delays_s.len() as u32;
    }

    set_system_state(ctx.state, ctx.hardware, ctx.log, SystemState::LickTraining)?;

    for delay_s in &delays_s {
        let delay_us = (delay_s * 1_000_000.0) as u64;
        let start_us = ctx.log.now_us();
        loop {
            runtime_cycle(ctx)?;
            if ctx.state.terminated {
                return Ok(());
            }
            let elapsed_us = ctx.log.now_us().saturating_sub(start_us);
            let paused_us = (ctx.state.paused_time_s * 1_000_000.0) as u64;
            if elapsed_us.saturating_sub(paused_us) >= delay_us {
                break;
            }
            std::thread::sleep(Duration::from_millis(SPEED_SAMPLE_INTERVAL_MS));
        }
        resolve_reward(ctx, LICK_TRAINING_REWARD_UL)?;
        ctx.state.paused_time_s = 0.0;
    }

    // Let the animal consume the final reward before the controller
    // hands back to shutdown.
    std::thread::sleep(Duration::from_secs_f64(fields.max_reward_delay_s));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> LickTrainingFields {
        LickTrainingFields {
            min_reward_delay_s: 6.0,
            max_reward_delay_s: 18.0,
            max_volume_ml: 0.010,
            max_time_s: 60.0,
        }
    }

    #[test]
    fn delay_sequence_prefix_sum_exceeds_the_volume_budget() {
        let f = fields();
        let delays = generate_delay_sequence_s(&f);
        let mean_delay_s = (f.min_reward_delay_s + f.max_reward_delay_s) / 2.0;
        let reward_count_budget = (f.max_volume_ml * 1000.0 / LICK_TRAINING_REWARD_UL).floor();
        let volume_budget_s = reward_count_budget * mean_delay_s;
        let sum: f64 = delays.iter().sum();
        assert!(sum > volume_budget_s.min(f.max_time_s));
        assert!(delays.iter().all(|&d| (f.min_reward_delay_s..=f.max_reward_delay_s).contains(&d)));
    }

    #[test]
    fn zero_cap_is_widened_to_sequence_length() {
        let f = fields();
        let delays = generate_delay_sequence_s(&f);
        let mut cap = 0u32;
        if cap < 1 {
            cap = delays.len() as u32;
        }
        assert_eq!(cap as usize, delays.len());
    }
}
