//! Wires the Module Interfaces (§4.2), Microcontroller Channels
//! (§4.3), Motor Group (§4.4), Video Subsystem (§2 item 4), and Unity
//! Bridge (§4.5) into one owned bundle the engine drives.
//!
//! Channel assignment follows the lab's physical wiring: the Actor
//! channel carries outbound actuators (valve, brake, screen), the
//! Sensor channel carries the lick and torque sensors plus any
//! auxiliary TTL lines, and the Encoder channel is dedicated to the
//! quadrature encoder alone since it is by far the highest-frequency
//! stream (§4.3: "Channels reserve one CPU each").
//!
//! Transport and frame-source backends are `simulation`-only (§1:
//! "low-level serial/USB transport ... specified only at the message
//! layer"); a hardware deployment would substitute real `Transport`/
//! `Axis`/`FrameSource` implementations behind the same traits.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use mesoscope_common::hardware_state::HardwareState;
use mesoscope_common::positions::ZaberPositions;
use mesoscope_hal::channel::{spawn_channel, ChannelHandle, ChannelKind};
use mesoscope_hal::interfaces::{
    BrakeInterface, EncoderInterface, LickInterface, ScreenInterface, TorqueInterface, TtlInterface,
    ValveInterface,
};
use mesoscope_hal::module_interface::{Command, ModuleInterface};
use mesoscope_hal::motor_group::{MotorGroup, SimulatedAxis};
use mesoscope_hal::simulation::SimulatedTransport;
use mesoscope_hal::video::{CameraPipeline, SimulatedFrameSource, VideoSubsystem, LOG_SOURCE_BODY_CAMERA, LOG_SOURCE_FACE_CAMERA};
use mesoscope_shm::tracker::MesoscopePulseTracker;
use mesoscope_shm::LogBus;
use mesoscope_unity::UnityBridge;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub struct Hardware {
    actor_channel: Option<ChannelHandle>,
    sensor_channel: Option<ChannelHandle>,
    encoder_channel: Option<ChannelHandle>,

    pub encoder: Arc<EncoderInterface>,
    pub lick: Arc<LickInterface>,
    pub valve: Arc<ValveInterface>,
    pub brake: Arc<BrakeInterface>,
    pub torque: Arc<TorqueInterface>,
    pub ttl: Vec<Arc<TtlInterface>>,
    pub screen: Arc<ScreenInterface>,
    pub mesoscope_ttl_module_id: Option<u8>,
    lick_threshold_adc: u16,

    pub motors: MotorGroup,
    pub video: VideoSubsystem,
    pub unity: Option<UnityBridge>,
}

impl Hardware {
    pub fn build(
        config: &EngineConfig,
        log_bus: &LogBus,
        cached_zaber: Option<ZaberPositions>,
        camera_dir: &Path,
    ) -> EngineResult<Self> {
        let encoder = Arc::new(EncoderInterface::new(
            config.encoder.module_id,
            config.encoder.ppr,
            config.encoder.wheel_diameter_cm,
            config.encoder.cm_per_unity_unit,
            config.encoder.polling_delay_us,
        ));
        let lick = Arc::new(LickInterface::new(
            config.lick.module_id,
            config.lick.lick_threshold_adc,
            config.lick.polling_delay_us,
        ));
        let valve = Arc::new(ValveInterface::new(config.valve.module_id, &config.valve.calibration_points));
        let brake = Arc::new(BrakeInterface::new(
            config.brake.module_id,
            config.brake.min_torque_g_cm,
            config.brake.max_torque_g_cm,
            config.brake.wheel_diameter_cm,
        ));
        let torque = Arc::new(TorqueInterface::new(
            config.torque.module_id,
            config.torque.baseline_adc,
            config.torque.max_adc,
            config.torque.sensor_capacity_g_cm,
            config.torque.polling_us,
        ));
        let ttl: Vec<Arc<TtlInterface>> = config
            .ttl
            .iter()
            .map(|t| Arc::new(TtlInterface::new(t.module_id, t.pulse_reporter)))
            .collect();
        let screen = Arc::new(ScreenInterface::new(
            config.screen.module_id,
            config.screen.pulse_duration_us,
            config.screen.initially_on,
        ));
        let mesoscope_ttl_module_id = config.mesoscope.as_ref().map(|m| m.ttl_module_id);

        let actor_interfaces: Vec<Arc<dyn ModuleInterface>> =
            vec![valve.clone(), brake.clone(), screen.clone()];
        let mut sensor_interfaces: Vec<Arc<dyn ModuleInterface>> = vec![lick.clone(), torque.clone()];
        sensor_interfaces.extend(ttl.iter().cloned().map(|t| t as Arc<dyn ModuleInterface>));
        let encoder_interfaces: Vec<Arc<dyn ModuleInterface>> = vec![encoder.clone()];

        let actor_channel = Some(spawn_channel(
            ChannelKind::Actor,
            Box::new(SimulatedTransport::new()),
            actor_interfaces,
            log_bus.handle(),
        )?);
        let sensor_channel = Some(spawn_channel(
            ChannelKind::Sensor,
            Box::new(SimulatedTransport::new()),
            sensor_interfaces,
            log_bus.handle(),
        )?);
        let encoder_channel = Some(spawn_channel(
            ChannelKind::Encoder,
            Box::new(SimulatedTransport::new()),
            encoder_interfaces,
            log_bus.handle(),
        )?);

        let m = &config.motors;
        let motors = MotorGroup::new(
            Box::new(SimulatedAxis::new("headbar_z", m.headbar_z.to_targets())),
            Box::new(SimulatedAxis::new("headbar_pitch", m.headbar_pitch.to_targets())),
            Box::new(SimulatedAxis::new("headbar_roll", m.headbar_roll.to_targets())),
            Box::new(SimulatedAxis::new("wheel_x", m.wheel_x.to_targets())),
            Box::new(SimulatedAxis::new("lickport_z", m.lickport_z.to_targets())),
            Box::new(SimulatedAxis::new("lickport_x", m.lickport_x.to_targets())),
            Box::new(SimulatedAxis::new("lickport_y", m.lickport_y.to_targets())),
            cached_zaber,
        );

        let face_running = Arc::new(AtomicBool::new(true));
        let body_running = Arc::new(AtomicBool::new(true));
        let face_source = Box::new(SimulatedFrameSource::new(
            1,
            config.video.width,
            config.video.height,
            config.video.face_fps,
            face_running.clone(),
        ));
        let body_sources: Vec<Box<dyn mesoscope_hal::video::FrameSource>> = vec![
            Box::new(SimulatedFrameSource::new(
                2,
                config.video.width,
                config.video.height,
                config.video.body_fps,
                body_running.clone(),
            )),
            Box::new(SimulatedFrameSource::new(
                3,
                config.video.width,
                config.video.height,
                config.video.body_fps,
                body_running,
            )),
        ];
        let face = CameraPipeline::spawn(
            "face",
            vec![face_source],
            camera_dir.join("face_camera.mp4"),
            LOG_SOURCE_FACE_CAMERA,
            log_bus.handle(),
        )?;
        let body = CameraPipeline::spawn(
            "body",
            body_sources,
            camera_dir.join("body_camera.mp4"),
            LOG_SOURCE_BODY_CAMERA,
            log_bus.handle(),
        )?;
        let video = VideoSubsystem { face, body };

        let unity = match &config.unity {
            Some(cfg) => Some(UnityBridge::connect(&cfg.broker, cfg.port, &cfg.client_id)?),
            None => None,
        };

        Ok(Self {
            actor_channel,
            sensor_channel,
            encoder_channel,
            encoder,
            lick,
            valve,
            brake,
            torque,
            ttl,
            screen,
            mesoscope_ttl_module_id,
            lick_threshold_adc: config.lick.lick_threshold_adc,
            motors,
            video,
            unity,
        })
    }

    /// Sends a command to the valve/brake/screen interface owning
    /// `(module_type, module_id)` over the Actor channel.
    pub fn send_actor(&self, module_type: u8, module_id: u8, command: &Command) -> EngineResult<()> {
        if let Some(channel) = &self.actor_channel {
            channel.send(module_type, module_id, command)?;
        }
        Ok(())
    }

    /// Sends a command to the lick/torque/TTL interface owning
    /// `(module_type, module_id)` over the Sensor channel.
    pub fn send_sensor(&self, module_type: u8, module_id: u8, command: &Command) -> EngineResult<()> {
        if let Some(channel) = &self.sensor_channel {
            channel.send(module_type, module_id, command)?;
        }
        Ok(())
    }

    /// Sends a command to the encoder interface over the Encoder
    /// channel (monitoring on/off per system-state transition, §4.8.f).
    pub fn send_encoder(&self, module_type: u8, module_id: u8, command: &Command) -> EngineResult<()> {
        if let Some(channel) = &self.encoder_channel {
            channel.send(module_type, module_id, command)?;
        }
        Ok(())
    }

    /// The mesoscope frame-trigger TTL instance's pulse tracker, if
    /// this session is configured to use the mesoscope (§4.8.d).
    pub fn mesoscope_tracker(&self) -> Option<Arc<MesoscopePulseTracker>> {
        let module_id = self.mesoscope_ttl_module_id?;
        self.ttl
            .iter()
            .find(|t| t.module_id() == module_id)
            .and_then(|t| t.tracker())
    }

    /// `HardwareState` snapshot (§3, §4.8 startup step 4): every
    /// calibration constant actually in effect for this session.
    pub fn hardware_state_snapshot(&self) -> HardwareState {
        HardwareState {
            encoder_cm_per_pulse: self.encoder.cm_per_pulse,
            encoder_unity_per_pulse: self.encoder.unity_per_pulse,
            brake_min_torque_n_cm: self.brake.min_torque_n_cm,
            brake_max_torque_n_cm: self.brake.max_torque_n_cm,
            lick_adc_threshold: self.lick_threshold_adc,
            valve_scale_coefficient: self.valve.a,
            valve_nonlinearity_exponent: self.valve.b,
            torque_n_cm_per_adc: self.torque.torque_n_cm_per_adc,
            mesoscope_ttl_recorded: false,
        }
    }

    /// Stops channels and video; motors and Unity are stopped
    /// separately by the shutdown sequence, which needs finer-grained
    /// ordering (§4.9 "Shutdown").
    pub fn stop_channels_and_video(self) -> EngineResult<Option<UnityBridge>> {
        if let Some(channel) = self.actor_channel {
            channel.stop()?;
        }
        if let Some(channel) = self.sensor_channel {
            channel.stop()?;
        }
        if let Some(channel) = self.encoder_channel {
            channel.stop()?;
        }
        self.video.stop();
        Ok(self.unity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use tempfile::TempDir;

    fn sample_config() -> EngineConfig {
        let targets = AxisTargetsConfig { park: 0, maintenance: 100, mount: 50, min_limit: -10_000, max_limit: 10_000 };
        EngineConfig {
            encoder: EncoderConfig { module_id: 1, ppr: 8192, wheel_diameter_cm: 15.0, cm_per_unity_unit: 10.0, polling_delay_us: 1000 },
            lick: LickConfig { module_id: 2, lick_threshold_adc: 1800, polling_delay_us: 1000 },
            valve: ValveConfig { module_id: 3, calibration_points: vec![(5000.0, 2.0), (10000.0, 4.5), (20000.0, 9.8), (40000.0, 20.1)] },
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
    fn builds_and_stops_simulated_hardware() {
        let tmp = TempDir::new().unwrap();
        let log_bus = LogBus::start(tmp.path().join("log")).unwrap();
        let config = sample_config();
        let hw = Hardware::build(&config, &log_bus, None, tmp.path()).unwrap();
        assert!(hw.motors.is_connected());
        let snapshot = hw.hardware_state_snapshot();
        assert!(snapshot.encoder_cm_per_pulse > 0.0);
        hw.stop_channels_and_video().unwrap();
        log_bus.stop().unwrap();
    }
}
