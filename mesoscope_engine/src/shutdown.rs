//! Shutdown sequence (§4.9 "Shutdown" — the mandatory block every task
//! controller lands in, including after an unexpected task-loop error).

use crate::cycle::set_system_state;
use crate::error::EngineResult;
use crate::operator::Operator;
use crate::preprocess::{PreprocessStep, Preprocessor};
use crate::startup::{kinase_marker, phosphatase_marker, write_yaml, SessionContext};
use mesoscope_common::state::SystemState;

/// Runs the full shutdown sequence against a [`SessionContext`],
/// consuming it. Callers invoke this from a single `match` arm that
/// covers both the task controller's `Ok(())` and `Err(_)` outcomes, so
/// shutdown always runs exactly once per session (§7).
pub fn shutdown(
    mut ctx: SessionContext,
    session_name: &str,
    operator: &mut dyn Operator,
    preprocessor: &mut dyn Preprocessor,
) -> EngineResult<Vec<PreprocessStep>> {
    // 1. Set Idle: screens off, brake engaged, encoder monitoring off.
    set_system_state(&mut ctx.state, &ctx.hardware, &ctx.log_bus.handle(), SystemState::Idle)?;

    // 2. Shut down UI and Visualizer: the termination cell is the
    // engine's sole signal to the sibling UI process; the Visualizer
    // is driven purely through `VisualizerSink` pushes and has no
    // teardown handshake of its own.
    ctx.control.set(mesoscope_shm::control_vector::IDX_TERMINATION, 1)?;

    // 3. Snapshot final Zaber positions, then park and release the
    // motors (operator may decline to park e.g. to keep the animal in
    // place for a manual check). Must happen before `Hardware` is
    // consumed below.
    let zaber_snapshot = ctx.hardware.motors.generate_position_snapshot();
    write_yaml(&ctx.layout.zaber_positions_yaml(), &zaber_snapshot)?;
    if operator.ask_yes_no("Park the motors before disconnecting?") {
        ctx.hardware.motors.park_position()?;
    }

    // 4. If the mesoscope was armed, drop the stop marker before the
    // channel/video teardown below so the frame source sees it land
    // while its watchdog thread is still alive to notice.
    if ctx.mesoscope_armed() {
        let _ = std::fs::remove_file(kinase_marker(&ctx.layout));
        std::fs::write(phosphatase_marker(&ctx.layout), b"").ok();
    }

    // 5. Disconnect Unity, stop channels, stop cameras.
    let unity = ctx.hardware.stop_channels_and_video()?;
    if let Some(unity) = unity {
        unity.disconnect();
    }

    // 6. Validate and persist the final descriptor. A placeholder-notes
    // failure is non-fatal here: the session stays marked incomplete
    // and the operator is told, rather than losing the data entirely.
    match ctx.descriptor.validate_notes(&ctx.layout.session_descriptor_yaml()) {
        Ok(()) => ctx.descriptor.core_mut().incomplete = false,
        Err(err) => {
            operator.echo(&format!(
                "Warning: {err}. Session will be saved with incomplete=true."
            ));
        }
    }
    ctx.descriptor.core_mut().dispensed_during_run_ul = ctx.state.delivered_water_ul;
    ctx.descriptor.core_mut().dispensed_during_pause_ul = ctx.state.paused_water_ul;
    ctx.descriptor.save_yaml(&ctx.layout.session_descriptor_yaml())?;

    // 7. Stop the log bus, flushing every shard to disk.
    let descriptor_incomplete = ctx.descriptor.core().incomplete;
    let water_delivered_ul = ctx.state.delivered_water_ul + ctx.state.paused_water_ul;
    ctx.log_bus.stop()?;

    // 8. Preprocess, unless the operator explicitly skips it (e.g. a
    // window-checking session with nothing worth transferring).
    if operator.ask_yes_no("Run the post-session preprocessing pipeline now?") {
        let steps = preprocessor.run(&ctx.layout, session_name, descriptor_incomplete, water_delivered_ul)?;
        Ok(steps)
    } else {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::operator::ScriptedOperator;
    use crate::preprocess::NullPreprocessor;
    use crate::startup::startup;
    use mesoscope_common::config::SystemConfiguration;
    use mesoscope_common::descriptor::{DescriptorCore, SessionDescriptor, WindowCheckingFields};
    use mesoscope_common::identity::{SessionIdentity, SessionType};
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
    fn shutdown_persists_final_descriptor_and_stops_log_bus() {
        let tmp = TempDir::new().unwrap();
        let system = system_config(&tmp);
        let config = engine_config();
        let identity = SessionIdentity::new("mesoscope_vr", "mouse_042", SessionType::WindowChecking, "1.0.0", "0.9.0");
        let descriptor = SessionDescriptor::WindowChecking {
            core: {
                let mut core = DescriptorCore::new("alice", 22.0);
                core.experimenter_notes = "Animal was alert throughout.".into();
                core
            },
            fields: WindowCheckingFields { notes_only: true },
        };
        let mut startup_operator = ScriptedOperator::new();
        let ctx =
            startup(&system, &config, &identity, descriptor, None, None, false, &mut startup_operator).unwrap();
        let raw_data = ctx.layout.raw_data.clone();

        let mut shutdown_operator = ScriptedOperator::new().with_yes_no(true).with_yes_no(false);
        let mut preprocessor = NullPreprocessor;
        let steps = shutdown(ctx, "test_session", &mut shutdown_operator, &mut preprocessor).unwrap();

        assert!(steps.is_empty(), "operator declined preprocessing");
        let descriptor_text = std::fs::read_to_string(raw_data.join("session_descriptor.yaml")).unwrap();
        assert!(descriptor_text.contains("incomplete: false"));
    }
}
