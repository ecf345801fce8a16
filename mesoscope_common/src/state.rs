//! System state enumeration (§3 "SystemState").
//!
//! The engine stores two `u8` codes — current and pre-pause — and uses
//! this enum only as a typed view over them; `SystemState` transitions
//! are the sole writer of the underlying codes.

use serde::{Deserialize, Serialize};

/// Coarse hardware configuration the engine drives on every state
/// transition (§4.8.f transition matrix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemState {
    Idle = 0,
    Rest = 1,
    Run = 2,
    LickTraining = 3,
    RunTraining = 4,
}

impl SystemState {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::Rest),
            2 => Some(Self::Run),
            3 => Some(Self::LickTraining),
            4 => Some(Self::RunTraining),
            _ => None,
        }
    }

    /// Transition matrix (§4.8.f): whether the display screens should be on.
    pub const fn screens_on(self) -> bool {
        matches!(self, Self::Run)
    }

    /// Whether the wheel brake should be engaged.
    pub const fn brake_engaged(self) -> bool {
        matches!(self, Self::Idle | Self::Rest | Self::LickTraining)
    }

    /// Whether encoder monitoring should be enabled.
    pub const fn encoder_monitoring(self) -> bool {
        matches!(self, Self::Run | Self::RunTraining)
    }

    /// Whether torque monitoring should be enabled.
    pub const fn torque_monitoring(self) -> bool {
        matches!(self, Self::Rest | Self::LickTraining)
    }

    /// Whether lick monitoring should be enabled.
    pub const fn lick_monitoring(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// `runtime_state` value this system state forces, if any is fixed
    /// by the transition (§4.8.f): Idle resets it to 0, LickTraining and
    /// RunTraining force it to 255 (active). Other states leave the
    /// runtime_state set by the task controller untouched.
    pub const fn forced_runtime_state(self) -> Option<u8> {
        match self {
            Self::Idle => Some(crate::consts::RUNTIME_STATE_IDLE),
            Self::LickTraining | Self::RunTraining => Some(crate::consts::RUNTIME_STATE_ACTIVE),
            Self::Rest | Self::Run => None,
        }
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_codes() {
        for code in 0..=4u8 {
            let s = SystemState::from_code(code).unwrap();
            assert_eq!(s.code(), code);
        }
        assert!(SystemState::from_code(5).is_none());
    }

    #[test]
    fn transition_matrix_matches_table() {
        // | State | Screens | Brake | Encoder | Torque | Lick |
        assert_eq!(
            (
                SystemState::Idle.screens_on(),
                SystemState::Idle.brake_engaged(),
                SystemState::Idle.encoder_monitoring(),
                SystemState::Idle.torque_monitoring(),
                SystemState::Idle.lick_monitoring(),
            ),
            (false, true, false, false, false)
        );
        assert_eq!(
            (
                SystemState::Rest.screens_on(),
                SystemState::Rest.brake_engaged(),
                SystemState::Rest.encoder_monitoring(),
                SystemState::Rest.torque_monitoring(),
                SystemState::Rest.lick_monitoring(),
            ),
            (false, true, false, true, true)
        );
        assert_eq!(
            (
                SystemState::Run.screens_on(),
                SystemState::Run.brake_engaged(),
                SystemState::Run.encoder_monitoring(),
                SystemState::Run.torque_monitoring(),
                SystemState::Run.lick_monitoring(),
            ),
            (true, false, true, false, true)
        );
        assert_eq!(
            (
                SystemState::LickTraining.screens_on(),
                SystemState::LickTraining.brake_engaged(),
                SystemState::LickTraining.encoder_monitoring(),
                SystemState::LickTraining.torque_monitoring(),
                SystemState::LickTraining.lick_monitoring(),
            ),
            (false, true, false, true, true)
        );
        assert_eq!(
            (
                SystemState::RunTraining.screens_on(),
                SystemState::RunTraining.brake_engaged(),
                SystemState::RunTraining.encoder_monitoring(),
                SystemState::RunTraining.torque_monitoring(),
                SystemState::RunTraining.lick_monitoring(),
            ),
            (false, false, true, false, true)
        );
    }

    #[test]
    fn forced_runtime_state() {
        assert_eq!(SystemState::Idle.forced_runtime_state(), Some(0));
        assert_eq!(SystemState::LickTraining.forced_runtime_state(), Some(255));
        assert_eq!(SystemState::RunTraining.forced_runtime_state(), Some(255));
        assert_eq!(SystemState::Rest.forced_runtime_state(), None);
        assert_eq!(SystemState::Run.forced_runtime_state(), None);
    }
}
