//! `ZaberPositions` and `MesoscopePositions` (§3).

use serde::{Deserialize, Serialize};

/// Native-unit Zaber motor targets for the three motor groups
/// (headbar, wheel, lickport). Created either from the per-animal
/// cache or from a live snapshot; overwritten on every successful
/// session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZaberPositions {
    pub headbar_z: i32,
    pub headbar_pitch: i32,
    pub headbar_roll: i32,
    pub wheel_x: i32,
    pub lickport_z: i32,
    pub lickport_x: i32,
    pub lickport_y: i32,
}

/// Opaque, user-owned mesoscope stage coordinates (§3). The engine
/// only ever compares instances for equality to detect whether the
/// operator updated them between sessions; it never interprets the
/// individual fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MesoscopePositions {
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
    pub fast_z_mm: f64,
    pub tip_deg: f64,
    pub tilt_deg: f64,
    pub roll_deg: f64,
    pub laser_power_pct: f64,
    pub red_dot_alignment_z_mm: f64,
}

impl Default for MesoscopePositions {
    fn default() -> Self {
        Self {
            x_mm: 0.0,
            y_mm: 0.0,
            z_mm: 0.0,
            fast_z_mm: 0.0,
            tip_deg: 0.0,
            tilt_deg: 0.0,
            roll_deg: 0.0,
            laser_power_pct: 0.0,
            red_dot_alignment_z_mm: 0.0,
        }
    }
}
