//! Startup sequence (§4.8 "gate → interactive → assets") and the
//! `start_mesoscope()` arming retry loop.

use crate::config::EngineConfig;
use crate::cycle::set_system_state;
use crate::error::{EngineError, EngineResult};
use crate::hardware::Hardware;
use crate::operator::Operator;
use crate::state::EngineState;
use mesoscope_common::config::SystemConfiguration;
use mesoscope_common::consts::{
    CUE_SEQUENCE_TIMEOUT_S, MESOSCOPE_START_MAX_DECLINED_RETRIES, MESOSCOPE_START_MIN_PULSES,
    MESOSCOPE_START_POLL_S,
};
use mesoscope_common::descriptor::{SessionDescriptor, TrialStructure};
use mesoscope_common::filesystem::FilesystemLayout;
use mesoscope_common::hardware_state::HardwareState;
use mesoscope_common::identity::SessionIdentity;
use mesoscope_common::positions::ZaberPositions;
use mesoscope_common::state::SystemState;
use mesoscope_shm::control_vector::ControlVector;
use mesoscope_shm::LogBus;
use mesoscope_unity::topics;
use mesoscope_unity::UnityBridge;
use std::time::{Duration, Instant};

/// Everything startup hands off to a task controller and, eventually,
/// to shutdown.
pub struct SessionContext {
    pub hardware: Hardware,
    pub state: EngineState,
    pub log_bus: LogBus,
    pub control: ControlVector,
    pub layout: FilesystemLayout,
    pub descriptor: SessionDescriptor,
    pub trial_structure: Option<TrialStructure>,
    pub trial_indices: Option<Vec<usize>>,
    mesoscope_armed: bool,
    mesoscope_first_stray_cleanup: bool,
}

impl SessionContext {
    pub fn mesoscope_armed(&self) -> bool {
        self.mesoscope_armed
    }
}

pub(crate) fn kinase_marker(layout: &FilesystemLayout) -> std::path::PathBuf {
    layout.mesoscope_pc_shared.join("kinase.bin")
}

pub(crate) fn phosphatase_marker(layout: &FilesystemLayout) -> std::path::PathBuf {
    layout.mesoscope_pc_shared.join("phosphatase.bin")
}

/// `start_mesoscope()` (§4.8): retries until the operator declines past
/// `MESOSCOPE_START_MAX_DECLINED_RETRIES`.
pub fn start_mesoscope(ctx: &mut SessionContext, operator: &mut dyn Operator) -> EngineResult<()> {
    let mut declined = 0u32;
    loop {
        let _ = std::fs::remove_file(kinase_marker(&ctx.layout));
        let _ = std::fs::remove_file(phosphatase_marker(&ctx.layout));

        std::thread::sleep(Duration::from_secs(1));
        let tracker = ctx
            .hardware
            .mesoscope_tracker()
            .ok_or_else(|| EngineError::Precondition("mesoscope TTL module not configured".into()))?;
        if tracker.load() != 0 {
            return Err(EngineError::Precondition(
                "mesoscope pulses observed before arming; landing zone not quiescent".into(),
            ));
        }

        if !ctx.mesoscope_first_stray_cleanup {
            if ctx.layout.mesoscope_pc_shared.is_dir() {
                if let Ok(entries) = std::fs::read_dir(&ctx.layout.mesoscope_pc_shared) {
                    for entry in entries.flatten() {
                        let path = entry.path();
                        let is_stray_tif = path.extension().and_then(|e| e.to_str()) == Some("tif")
                            && !path
                                .file_name()
                                .and_then(|n| n.to_str())
                                .map(|n| n.starts_with("zstack"))
                                .unwrap_or(false);
                        if is_stray_tif {
                            let _ = std::fs::remove_file(&path);
                        }
                    }
                }
            }
            ctx.mesoscope_first_stray_cleanup = true;
        }

        std::fs::write(kinase_marker(&ctx.layout), b"")
            .map_err(|e| EngineError::Precondition(format!("creating kinase marker: {e}")))?;

        let deadline = Instant::now() + Duration::from_secs(MESOSCOPE_START_POLL_S);
        let mut armed = false;
        while Instant::now() < deadline {
            if tracker.load() >= MESOSCOPE_START_MIN_PULSES {
                armed = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        if armed {
            ctx.state.last_mesoscope_pulses = tracker.load();
            ctx.state.last_mesoscope_check_us = ctx.log_bus.now_us();
            ctx.mesoscope_armed = true;
            return Ok(());
        }

        let _ = std::fs::remove_file(kinase_marker(&ctx.layout));
        let retry = operator.ask_yes_no("Mesoscope did not report frame triggers. Retry arming?");
        if !retry {
            declined += 1;
            if declined >= MESOSCOPE_START_MAX_DECLINED_RETRIES {
                return Err(EngineError::Liveness(
                    "mesoscope failed to arm after the maximum number of declined retries".into(),
                ));
            }
        }
    }
}

/// Requests the Unity cue sequence and decomposes it against `trials`,
/// enforcing the 10 s fatal timeout (§5).
fn request_and_decompose_cue_sequence(
    unity: &UnityBridge,
    trials: &TrialStructure,
) -> EngineResult<(Vec<usize>, Vec<f64>)> {
    unity.request_cue_sequence()?;

    let deadline = Instant::now() + Duration::from_secs(CUE_SEQUENCE_TIMEOUT_S);
    let cues = loop {
        if Instant::now() >= deadline {
            return Err(EngineError::Liveness("Unity cue-sequence request timed out".into()));
        }
        if unity.has_data() {
            if let Some((topic, payload)) = unity.get_data() {
                if topic == topics::CUE_SEQUENCE {
                    break UnityBridge::parse_cue_sequence(&payload)?;
                }
            }
        } else {
            std::thread::sleep(Duration::from_millis(20));
        }
    };

    let motifs: Vec<Vec<u8>> = trials.trials.iter().map(|t| t.cue_motif.clone()).collect();
    let distances: Vec<f64> = trials.trials.iter().map(|t| t.length_cm).collect();
    mesoscope_unity::decomposer::decompose(&cues, &motifs, &distances)
        .map_err(|e| EngineError::Liveness(format!("cue-sequence decomposition failed: {e}")))
}

pub(crate) fn write_yaml<T: serde::Serialize>(path: &std::path::Path, value: &T) -> EngineResult<()> {
    let text = serde_yaml::to_string(value).map_err(|source| {
        mesoscope_common::error::ConfigError::YamlParse { path: path.to_path_buf(), source }
    })?;
    std::fs::write(path, text)
        .map_err(|source| mesoscope_common::error::ConfigError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

/// The 11-step startup sequence (§4.8).
#[allow(clippy::too_many_arguments)]
pub fn startup(
    system: &SystemConfiguration,
    engine_config: &EngineConfig,
    identity: &SessionIdentity,
    mut descriptor: SessionDescriptor,
    trial_structure: Option<TrialStructure>,
    cached_zaber: Option<ZaberPositions>,
    is_experiment: bool,
    operator: &mut dyn Operator,
) -> EngineResult<SessionContext> {
    // 1. Core-count gate.
    let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    if available < system.min_logical_cores() {
        return Err(EngineError::Precondition(format!(
            "host has {available} logical cores; at least {} required",
            system.min_logical_cores()
        )));
    }

    // 2. Derive the on-disk layout and cache the descriptor precursor
    // immediately, so a crash before full init still leaves a record.
    let layout = FilesystemLayout::create(&system.roots(), identity)?;
    std::fs::write(layout.nk_marker(), b"")
        .map_err(|e| EngineError::Precondition(format!("writing init marker: {e}")))?;
    write_yaml(&layout.session_data_yaml(), identity)?;
    descriptor.save_yaml(&layout.session_descriptor_yaml())?;

    // 3. Onset + monotonic timer reset.
    let log_bus = LogBus::start(layout.raw_data.clone())?;
    log_bus.onset();
    let mut state = EngineState::new();

    // 4. Start channels, set Idle, emit HardwareState snapshot.
    let hardware = Hardware::build(engine_config, &log_bus, cached_zaber, &layout.camera_data)?;
    set_system_state(&mut state, &hardware, &log_bus.handle(), SystemState::Idle)?;
    let snapshot: HardwareState = hardware.hardware_state_snapshot();
    write_yaml(&layout.hardware_state_yaml(), &snapshot)?;

    // 5. Unity scene verification + cue sequence + decomposition.
    let mut trial_indices = None;
    let mut resolved_trial_structure = trial_structure;
    if let (Some(unity), Some(trials)) = (hardware.unity.as_ref(), resolved_trial_structure.as_ref()) {
        unity.request_scene_name()?;
        operator.wait_for_enter("Verify the correct Unity scene is loaded, then press Enter.");
        let (indices, _cumulative) = request_and_decompose_cue_sequence(unity, trials)?;
        trial_indices = Some(indices);
        hardware.encoder.reset_distance_tracker();
    } else {
        resolved_trial_structure = None;
    }

    // 6. Start all cameras, acquisition only.
    // (`Hardware::build` already spawned both pipelines with saving
    // disabled; nothing further to do here.)

    // 7. Zaber setup + immediate checkpoint snapshot.
    hardware.motors.prepare_motors()?;
    hardware.motors.mount_position()?;
    hardware.motors.restore_position()?;
    let zaber_snapshot = hardware.motors.generate_position_snapshot();
    write_yaml(&layout.zaber_positions_yaml(), &zaber_snapshot)?;

    // 8. Experiment sessions: snapshot experiment YAML, then the
    // interactive Mesoscope prep ritual.
    if is_experiment {
        descriptor.save_yaml(&layout.experiment_configuration_yaml())?;
        operator.wait_for_enter(
            "Confirm the mesoscope prep checklist (zstack, FOV, MotionEstimator.me) is complete, then press Enter.",
        );
    }

    // 9. Start UI and Visualizer: the control-vector segment is created
    // here so both sibling processes can attach to it.
    let control_path = layout.raw_data.join("control_vector.shm");
    let control = ControlVector::create(control_path.to_str().ok_or_else(|| {
        EngineError::Configuration("control vector path is not valid UTF-8".into())
    })?)?;

    // 10. Checkpoint: block here until the operator confirms readiness;
    // the UI process clears `IDX_PAUSE_STATE` to exit.
    operator.wait_for_enter("Ready to resume from checkpoint; press Enter once the UI signals resume.");

    // 11. Begin saving camera frames; arm the mesoscope if configured.
    hardware.video.enable_saving();

    let mut ctx = SessionContext {
        hardware,
        state,
        log_bus,
        control,
        layout,
        descriptor,
        trial_structure: resolved_trial_structure,
        trial_indices,
        mesoscope_armed: false,
        mesoscope_first_stray_cleanup: false,
    };

    if engine_config.mesoscope.is_some() {
        set_system_state(&mut ctx.state, &ctx.hardware, &ctx.log_bus.handle(), SystemState::Rest)?;
        start_mesoscope(&mut ctx, operator)?;
    }

    std::fs::remove_file(ctx.layout.nk_marker()).ok();

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::ScriptedOperator;
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
        use crate::config::*;
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
    fn startup_builds_a_session_context_without_unity_or_mesoscope() {
        let tmp = TempDir::new().unwrap();
        let system = system_config(&tmp);
        let config = engine_config();
        let identity = SessionIdentity::new("mesoscope_vr", "mouse_042", SessionType::WindowChecking, "1.0.0", "0.9.0");
        let descriptor = SessionDescriptor::WindowChecking {
            core: {
                let mut core = DescriptorCore::new("alice", 22.0);
                core.experimenter_notes = "Animal was alert.".into();
                core
            },
            fields: WindowCheckingFields { notes_only: true },
        };
        let mut operator = ScriptedOperator::new();

        let ctx = startup(&system, &config, &identity, descriptor, None, None, false, &mut operator).unwrap();
        assert!(ctx.layout.raw_data.join("hardware_state.yaml").is_file());
        assert!(ctx.layout.raw_data.join("zaber_positions.yaml").is_file());
        assert!(!ctx.layout.nk_marker().is_file());
        assert!(!ctx.mesoscope_armed());

        ctx.hardware.stop_channels_and_video().unwrap();
        ctx.log_bus.stop().unwrap();
    }

    #[test]
    fn startup_rejects_hosts_below_the_core_gate() {
        let tmp = TempDir::new().unwrap();
        let mut system = system_config(&tmp);
        system.min_logical_cores_override = Some(usize::MAX);
        let config = engine_config();
        let identity = SessionIdentity::new("mesoscope_vr", "mouse_042", SessionType::WindowChecking, "1.0.0", "0.9.0");
        let descriptor = SessionDescriptor::WindowChecking {
            core: DescriptorCore::new("alice", 22.0),
            fields: WindowCheckingFields { notes_only: true },
        };
        let mut operator = ScriptedOperator::new();

        let err = startup(&system, &config, &identity, descriptor, None, None, false, &mut operator).unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }
}
