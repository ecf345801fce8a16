//! `SessionIdentity` and `SessionType` (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of session the engine runs; selects which task controller
/// drives the runtime loop (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    LickTraining,
    RunTraining,
    Experiment,
    WindowChecking,
}

/// Immutable record of who/what/when a session is (§3).
///
/// Created once at session start and persisted as `session_data.yaml`
/// next to the raw data; never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub project_name: String,
    pub animal_id: String,
    /// UTC timestamp at session creation; also used to name the session
    /// directory (`FilesystemLayout`).
    pub session_name: DateTime<Utc>,
    pub session_type: SessionType,
    pub software_version: String,
    pub library_version: String,
}

impl SessionIdentity {
    pub fn new(
        project_name: impl Into<String>,
        animal_id: impl Into<String>,
        session_type: SessionType,
        software_version: impl Into<String>,
        library_version: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            animal_id: animal_id.into(),
            session_name: Utc::now(),
            session_type,
            software_version: software_version.into(),
            library_version: library_version.into(),
        }
    }

    /// The directory-safe session name, e.g. `2026-07-28T14-03-11Z`.
    pub fn session_dir_name(&self) -> String {
        self.session_name.format("%Y-%m-%dT%H-%M-%SZ").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_dir_name_is_filesystem_safe() {
        let id = SessionIdentity::new(
            "mesoscope_vr",
            "mouse_042",
            SessionType::Experiment,
            "1.0.0",
            "0.9.0",
        );
        let name = id.session_dir_name();
        assert!(!name.contains(':'));
        assert!(name.ends_with('Z'));
    }

    #[test]
    fn yaml_roundtrip() {
        let id = SessionIdentity::new(
            "mesoscope_vr",
            "mouse_042",
            SessionType::LickTraining,
            "1.0.0",
            "0.9.0",
        );
        let yaml = serde_yaml::to_string(&id).unwrap();
        let back: SessionIdentity = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(id, back);
    }
}
