//! Engine-local configuration (§4.2 module parameters, §4.4 axis
//! targets, §4.5 Unity broker, §2 item 4 video settings). Loaded via
//! the blanket [`mesoscope_common::config::ConfigLoader`] impl, same
//! as [`mesoscope_common::config::SystemConfiguration`].

use mesoscope_hal::motor_group::AxisTargets;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub module_id: u8,
    pub ppr: u32,
    pub wheel_diameter_cm: f64,
    pub cm_per_unity_unit: f64,
    pub polling_delay_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LickConfig {
    pub module_id: u8,
    pub lick_threshold_adc: u16,
    pub polling_delay_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValveConfig {
    pub module_id: u8,
    /// `(pulse_us, volume_ul)` calibration pairs (§4.2).
    pub calibration_points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrakeConfig {
    pub module_id: u8,
    pub min_torque_g_cm: f64,
    pub max_torque_g_cm: f64,
    pub wheel_diameter_cm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorqueConfig {
    pub module_id: u8,
    pub baseline_adc: u16,
    pub max_adc: u16,
    pub sensor_capacity_g_cm: f64,
    pub polling_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    pub module_id: u8,
    pub pulse_reporter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    pub module_id: u8,
    pub pulse_duration_us: u64,
    pub initially_on: bool,
}

fn axis_targets(park: i32, maintenance: i32, mount: i32, min_limit: i32, max_limit: i32) -> AxisTargets {
    AxisTargets { park, maintenance, mount, min_limit, max_limit }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisTargetsConfig {
    pub park: i32,
    pub maintenance: i32,
    pub mount: i32,
    pub min_limit: i32,
    pub max_limit: i32,
}

impl AxisTargetsConfig {
    pub fn to_targets(self) -> AxisTargets {
        axis_targets(self.park, self.maintenance, self.mount, self.min_limit, self.max_limit)
    }
}

/// One `AxisTargetsConfig` per Motor Group axis (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorGroupConfig {
    pub headbar_z: AxisTargetsConfig,
    pub headbar_pitch: AxisTargetsConfig,
    pub headbar_roll: AxisTargetsConfig,
    pub wheel_x: AxisTargetsConfig,
    pub lickport_z: AxisTargetsConfig,
    pub lickport_x: AxisTargetsConfig,
    pub lickport_y: AxisTargetsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub width: usize,
    pub height: usize,
    pub face_fps: f64,
    pub body_fps: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self { width: 640, height: 480, face_fps: 30.0, body_fps: 30.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnityConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
}

/// Mesoscope TTL module id (§4.2 TTLInterface, "pulse reporter"
/// instance) plus the shared `mesoscope_pc` directory the watchdog
/// polls for marker files (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MesoscopeConfig {
    pub ttl_module_id: u8,
}

/// Full engine wiring configuration (§4.2–§4.5, §9 "injected
/// configuration capability with no module-level singleton").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub encoder: EncoderConfig,
    pub lick: LickConfig,
    pub valve: ValveConfig,
    pub brake: BrakeConfig,
    pub torque: TorqueConfig,
    pub ttl: Vec<TtlConfig>,
    pub screen: ScreenConfig,
    pub motors: MotorGroupConfig,
    pub video: VideoConfig,
    pub unity: Option<UnityConfig>,
    pub mesoscope: Option<MesoscopeConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesoscope_common::config::ConfigLoader;
    use tempfile::TempDir;

    fn sample_toml() -> &'static str {
        r#"
[encoder]
module_id = 1
ppr = 8192
wheel_diameter_cm = 15.0
cm_per_unity_unit = 10.0
polling_delay_us = 1000

[lick]
module_id = 2
lick_threshold_adc = 1800
polling_delay_us = 1000

[valve]
module_id = 3
calibration_points = [[5000.0, 2.0], [10000.0, 4.5], [20000.0, 9.8], [40000.0, 20.1]]

[brake]
module_id = 4
min_torque_g_cm = 0.0
max_torque_g_cm = 35000.0
wheel_diameter_cm = 15.0

[torque]
module_id = 5
baseline_adc = 100
max_adc = 900
sensor_capacity_g_cm = 500.0
polling_us = 1000

[[ttl]]
module_id = 6
pulse_reporter = false

[[ttl]]
module_id = 7
pulse_reporter = true

[screen]
module_id = 8
pulse_duration_us = 500
initially_on = true

[motors.headbar_z]
park = 0
maintenance = 5000
mount = 2000
min_limit = -100000
max_limit = 100000

[motors.headbar_pitch]
park = 0
maintenance = 100
mount = 50
min_limit = -10000
max_limit = 10000

[motors.headbar_roll]
park = 0
maintenance = 100
mount = 50
min_limit = -10000
max_limit = 10000

[motors.wheel_x]
park = 0
maintenance = 300
mount = 150
min_limit = -10000
max_limit = 10000

[motors.lickport_z]
park = 0
maintenance = 400
mount = 200
min_limit = -10000
max_limit = 10000

[motors.lickport_x]
park = 0
maintenance = 400
mount = 200
min_limit = -10000
max_limit = 10000

[motors.lickport_y]
park = 0
maintenance = 400
mount = 200
min_limit = -10000
max_limit = 10000

[video]
width = 640
height = 480
face_fps = 30.0
body_fps = 30.0

[unity]
broker = "localhost"
port = 1883
client_id = "mesoscope-engine"

[mesoscope]
ttl_module_id = 7
"#
    }

    #[test]
    fn loads_full_engine_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("engine.toml");
        std::fs::write(&path, sample_toml()).unwrap();

        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.encoder.ppr, 8192);
        assert_eq!(cfg.ttl.len(), 2);
        assert!(cfg.unity.is_some());
        assert_eq!(cfg.motors.lickport_z.to_targets().mount, 200);
    }
}
