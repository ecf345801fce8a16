//! The Session Engine's dispatcher: wires [`startup::startup`], the
//! session-type-appropriate task controller from [`tasks`], and
//! [`shutdown::shutdown`] into the single entry point a binary calls
//! once per session (§4.8, §4.9, §7).

use crate::config::EngineConfig;
use crate::cycle::RuntimeContext;
use crate::error::{EngineError, EngineResult};
use crate::operator::Operator;
use crate::preprocess::{PreprocessStep, Preprocessor};
use crate::sink::VisualizerSink;
use crate::startup::{self, SessionContext};
use crate::{shutdown, tasks};
use mesoscope_common::config::SystemConfiguration;
use mesoscope_common::descriptor::{ExperimentState, SessionDescriptor, TrialStructure};
use mesoscope_common::identity::SessionIdentity;
use mesoscope_common::positions::ZaberPositions;

/// Everything [`run_session`] needs besides the three capability
/// objects (operator, visualizer, preprocessor). Grouped into one
/// struct because the parameter list would otherwise grow with every
/// session type the engine learns to drive.
pub struct SessionPlan<'a> {
    pub system: &'a SystemConfiguration,
    pub engine_config: &'a EngineConfig,
    pub identity: &'a SessionIdentity,
    pub descriptor: SessionDescriptor,
    pub trial_structure: Option<TrialStructure>,
    /// Required (and only meaningful) for [`SessionDescriptor::Experiment`].
    pub experiment_phases: Option<Vec<ExperimentState>>,
    pub cached_zaber: Option<ZaberPositions>,
}

/// Runs one full session end to end: startup, the task controller that
/// matches `plan.descriptor`'s variant, and the mandatory shutdown
/// sequence. Shutdown always runs, including when the task controller
/// returns an error (§7 "Unexpected exception in task loop").
///
/// Per the propagation policy (§7), a shutdown-time error is logged and
/// swallowed rather than masking a task-loop error that already
/// explains what went wrong; it only surfaces on its own when the task
/// loop itself succeeded.
pub fn run_session(
    plan: SessionPlan<'_>,
    operator: &mut dyn Operator,
    visualizer: &mut dyn VisualizerSink,
    preprocessor: &mut dyn Preprocessor,
) -> EngineResult<Vec<PreprocessStep>> {
    let session_name = plan.identity.session_dir_name();
    let is_experiment = matches!(plan.descriptor, SessionDescriptor::Experiment { .. });

    let mut ctx = startup::startup(
        plan.system,
        plan.engine_config,
        plan.identity,
        plan.descriptor,
        plan.trial_structure,
        plan.cached_zaber,
        is_experiment,
        operator,
    )?;

    let max_unconsumed_rewards = ctx.descriptor.core().maximum_unconsumed_rewards;
    let task_result = run_task(
        &mut ctx,
        plan.experiment_phases.as_deref(),
        operator,
        visualizer,
        max_unconsumed_rewards,
    );

    let shutdown_result = shutdown::shutdown(ctx, &session_name, operator, preprocessor);

    match (task_result, shutdown_result) {
        (Ok(()), Ok(steps)) => Ok(steps),
        (Ok(()), Err(shutdown_err)) => {
            tracing::error!(error = %shutdown_err, "shutdown reported an error; raw data was preserved");
            Ok(Vec::new())
        }
        (Err(task_err), Err(shutdown_err)) => {
            tracing::error!(error = %shutdown_err, "shutdown also failed after an unwound task loop");
            Err(task_err)
        }
        (Err(task_err), Ok(_)) => Err(task_err),
    }
}

fn run_task(
    ctx: &mut SessionContext,
    experiment_phases: Option<&[ExperimentState]>,
    operator: &mut dyn Operator,
    visualizer: &mut dyn VisualizerSink,
    max_unconsumed_rewards: u32,
) -> EngineResult<()> {
    let log_handle = ctx.log_bus.handle();
    let unity = ctx.hardware.unity.as_ref();
    let trial_structure = ctx.trial_structure.as_ref();
    let trial_indices = ctx.trial_indices.as_deref();
    let descriptor = &ctx.descriptor;

    let mut rc = RuntimeContext {
        state: &mut ctx.state,
        hardware: &ctx.hardware,
        log: &log_handle,
        control: &ctx.control,
        operator,
        visualizer,
        unity,
        trial_structure,
        trial_indices,
        max_unconsumed_rewards,
    };

    match descriptor {
        SessionDescriptor::LickTraining { fields, .. } => tasks::lick_training::run(&mut rc, fields),
        SessionDescriptor::RunTraining { fields, .. } => tasks::run_training::run(&mut rc, fields),
        SessionDescriptor::Experiment { .. } => {
            let phases = experiment_phases.ok_or_else(|| {
                EngineError::Configuration("experiment session requires a phase schedule".into())
            })?;
            tasks::experiment::run(&mut rc, phases)
        }
        SessionDescriptor::WindowChecking { .. } => tasks::window_checking::run(&mut rc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::operator::ScriptedOperator;
    use crate::preprocess::NullPreprocessor;
    use crate::sink::NullVisualizerSink;
    use mesoscope_common::descriptor::{DescriptorCore, WindowCheckingFields};
    use mesoscope_common::identity::SessionType;
    use tempfile::TempDir;

    fn system_config(tmp: &TempDir) -> SystemConfiguration {
        let base = tmp.path();
        SystemConfiguration {
            local_root: base.join("local"),
            persistent_root: base.join("persistent"),
            nas_root: base.join("nas"),
            server_root: base.join("server"),
            mesoscope_pc_shared_root: base.join("meso_shared"),
            mesoscope_pc_persistent_root: base.join("meso_persistent"),
            unity_mqtt_broker: "localhost".into(),
            unity_mqtt_port: 1883,
            log_level: mesoscope_common::config::LogLevel::Info,
            min_logical_cores_override: Some(1),
        }
    }

    fn engine_config() -> EngineConfig {
        let targets =
            AxisTargetsConfig { park: 0, maintenance: 100, mount: 50, min_limit: -10_000, max_limit: 10_000 };
        EngineConfig {
            encoder: EncoderConfig { module_id: 1, ppr: 8192, wheel_diameter_cm: 15.0, cm_per_unity_unit: 10.0, polling_delay_us: 1000 },
            lick: LickConfig { module_id: 2, lick_threshold_adc: 1800, polling_delay_us: 1000 },
            valve: ValveConfig { module_id: 3, calibration_points: vec![(5000.0, 2.0), (40000.0, 20.0)] },
            brake: BrakeConfig { module_id: 4, min_torque_g_cm: 0.0, max_torque_g_cm: 35_000.0, wheel_diameter_cm: 15.0 },
            torque: TorqueConfig { module_id: 5, baseline_adc: 100, max_adc: 900, sensor_capacity_g_cm: 500.0, polling_us: 1000 },
            ttl: vec![TtlConfig { module_id: 6, pulse_reporter: false }],
            screen: ScreenConfig { module_id: 7, pulse_duration_us: 500, initially_on: true },
            motors: MotorGroupConfig {
                headbar_z: targets,
                headbar_pitch: targets,
                headbar_roll: targets,
                wheel_x: targets,
                lickport_z: targets,
                lickport_x: targets,
                lickport_y: targets,
            },
            video: VideoConfig { width: 4, height: 4, face_fps: 200.0, body_fps: 200.0 },
            unity: None,
            mesoscope: None,
        }
    }

    #[test]
    fn window_checking_session_skips_the_runtime_loop_and_completes() {
        let tmp = TempDir::new().unwrap();
        let system = system_config(&tmp);
        let config = engine_config();
        let identity = SessionIdentity::new("mesoscope_vr", "mouse_042", SessionType::WindowChecking, "1.0.0", "0.9.0");
        let descriptor = SessionDescriptor::WindowChecking {
            core: {
                let mut core = DescriptorCore::new("alice", 22.0);
                core.experimenter_notes = "Window looked clear.".into();
                core
            },
            fields: WindowCheckingFields { notes_only: true },
        };
        let plan = SessionPlan {
            system: &system,
            engine_config: &config,
            identity: &identity,
            descriptor,
            trial_structure: None,
            experiment_phases: None,
            cached_zaber: None,
        };

        let mut operator = ScriptedOperator::new().with_yes_no(true).with_yes_no(false);
        let mut visualizer = NullVisualizerSink;
        let mut preprocessor = NullPreprocessor;

        let steps = run_session(plan, &mut operator, &mut visualizer, &mut preprocessor).unwrap();
        assert!(steps.is_empty(), "operator declined preprocessing in the script");
    }
}
