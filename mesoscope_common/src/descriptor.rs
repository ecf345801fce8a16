//! `SessionDescriptor` tagged union, `TrialStructure`, and
//! `ExperimentState` (§3).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Sentinel the operator must replace in `experimenter_notes` before
/// the descriptor is considered valid (§3).
pub const NOTES_PLACEHOLDER: &str = "Replace with experiment notes.";

/// Fields shared by every session type (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorCore {
    pub experimenter_id: String,
    pub mouse_weight_g: f64,
    /// Starts `true`; cleared only on graceful stop.
    pub incomplete: bool,
    pub dispensed_during_run_ul: f64,
    pub dispensed_during_pause_ul: f64,
    pub experimenter_given_water_ul: f64,
    pub maximum_unconsumed_rewards: u32,
    pub experimenter_notes: String,
}

impl DescriptorCore {
    pub fn new(experimenter_id: impl Into<String>, mouse_weight_g: f64) -> Self {
        Self {
            experimenter_id: experimenter_id.into(),
            mouse_weight_g,
            incomplete: true,
            dispensed_during_run_ul: 0.0,
            dispensed_during_pause_ul: 0.0,
            experimenter_given_water_ul: 0.0,
            maximum_unconsumed_rewards: 1,
            experimenter_notes: NOTES_PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LickTrainingFields {
    pub min_reward_delay_s: f64,
    pub max_reward_delay_s: f64,
    pub max_volume_ml: f64,
    pub max_time_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrainingFields {
    pub initial_speed_threshold_cm_s: f64,
    pub initial_duration_threshold_ms: f64,
    pub speed_step_cm_s: f64,
    pub duration_step_ms: f64,
    pub increase_threshold_ul: f64,
    pub max_volume_ml: f64,
    pub max_time_s: f64,
    pub max_idle_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentFields {
    pub max_volume_ml: f64,
    pub max_time_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCheckingFields {
    pub notes_only: bool,
}

/// Type-tagged variant over the four session kinds (§3). Task logic
/// pattern-matches on the variant; every variant shares `DescriptorCore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "session_type", rename_all = "snake_case")]
pub enum SessionDescriptor {
    LickTraining {
        #[serde(flatten)]
        core: DescriptorCore,
        #[serde(flatten)]
        fields: LickTrainingFields,
    },
    RunTraining {
        #[serde(flatten)]
        core: DescriptorCore,
        #[serde(flatten)]
        fields: RunTrainingFields,
    },
    Experiment {
        #[serde(flatten)]
        core: DescriptorCore,
        #[serde(flatten)]
        fields: ExperimentFields,
    },
    WindowChecking {
        #[serde(flatten)]
        core: DescriptorCore,
        #[serde(flatten)]
        fields: WindowCheckingFields,
    },
}

impl SessionDescriptor {
    pub fn core(&self) -> &DescriptorCore {
        match self {
            Self::LickTraining { core, .. }
            | Self::RunTraining { core, .. }
            | Self::Experiment { core, .. }
            | Self::WindowChecking { core, .. } => core,
        }
    }

    pub fn core_mut(&mut self) -> &mut DescriptorCore {
        match self {
            Self::LickTraining { core, .. }
            | Self::RunTraining { core, .. }
            | Self::Experiment { core, .. }
            | Self::WindowChecking { core, .. } => core,
        }
    }

    /// Validates that the operator replaced the placeholder notes
    /// string (§3: "the engine validates that the placeholder string
    /// has been removed").
    pub fn validate_notes(&self, path: &Path) -> Result<(), ConfigError> {
        if self.core().experimenter_notes == NOTES_PLACEHOLDER {
            return Err(ConfigError::Validation {
                path: path.to_path_buf(),
                reason: "experimenter_notes still contains the placeholder string".to_string(),
            });
        }
        Ok(())
    }

    pub fn load_yaml(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_yaml(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_yaml::to_string(self).map_err(|source| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// One trial type's cue motif, track length, and reward schedule (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDefinition {
    pub name: String,
    pub cue_motif: Vec<u8>,
    pub length_cm: f64,
    pub reward_ul: f64,
    pub tone_ms: u32,
}

/// Experiment-only trial layout (§3).
///
/// `cumulative_distance_cm[i]` is strictly increasing by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialStructure {
    pub trials: Vec<TrialDefinition>,
}

impl TrialStructure {
    /// `cumulative_distance_cm[i] = sum of lengths of decomposed trials 0..=i`.
    pub fn cumulative_distance_cm(&self, trial_indices: &[usize]) -> Vec<f64> {
        let mut running = 0.0;
        trial_indices
            .iter()
            .map(|&i| {
                running += self.trials[i].length_cm;
                running
            })
            .collect()
    }

    /// `(reward_uL, tone_ms)` for the trial at decomposed position `i`.
    pub fn reward_schedule(&self, trial_indices: &[usize]) -> Vec<(f64, u32)> {
        trial_indices
            .iter()
            .map(|&i| (self.trials[i].reward_ul, self.trials[i].tone_ms))
            .collect()
    }
}

/// One phase of an experiment (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentState {
    /// `runtime_state` code written while this phase is active (1..N).
    pub state_code: u8,
    /// Underlying `SystemState` this phase drives: `Rest` or `Run`.
    pub system_state: crate::state::SystemState,
    pub duration_s: f64,
    pub initial_guided_trials: u32,
    pub failed_threshold: u32,
    pub recovery_guided_trials: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_placeholder_notes() {
        let core = DescriptorCore::new("alice", 22.5);
        let desc = SessionDescriptor::LickTraining {
            core,
            fields: LickTrainingFields {
                min_reward_delay_s: 6.0,
                max_reward_delay_s: 18.0,
                max_volume_ml: 0.01,
                max_time_s: 60.0,
            },
        };
        assert!(desc.validate_notes(Path::new("session_descriptor.yaml")).is_err());
    }

    #[test]
    fn accepts_edited_notes() {
        let mut core = DescriptorCore::new("alice", 22.5);
        core.experimenter_notes = "Animal was alert throughout.".to_string();
        let desc = SessionDescriptor::RunTraining {
            core,
            fields: RunTrainingFields {
                initial_speed_threshold_cm_s: 1.0,
                initial_duration_threshold_ms: 1000.0,
                speed_step_cm_s: 0.1,
                duration_step_ms: 100.0,
                increase_threshold_ul: 10.0,
                max_volume_ml: 0.05,
                max_time_s: 300.0,
                max_idle_time_ms: 500.0,
            },
        };
        assert!(desc.validate_notes(Path::new("session_descriptor.yaml")).is_ok());
    }

    #[test]
    fn cumulative_distance_is_strictly_increasing() {
        let structure = TrialStructure {
            trials: vec![
                TrialDefinition {
                    name: "a".into(),
                    cue_motif: vec![1, 1, 2],
                    length_cm: 30.0,
                    reward_ul: 5.0,
                    tone_ms: 200,
                },
                TrialDefinition {
                    name: "b".into(),
                    cue_motif: vec![3, 3, 3, 4],
                    length_cm: 50.0,
                    reward_ul: 8.0,
                    tone_ms: 200,
                },
            ],
        };
        let indices = vec![0, 1, 0];
        let cumulative = structure.cumulative_distance_cm(&indices);
        assert_eq!(cumulative, vec![30.0, 80.0, 110.0]);
        for w in cumulative.windows(2) {
            assert!(w[1] > w[0]);
        }
    }
}
