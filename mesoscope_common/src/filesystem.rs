//! `FilesystemLayout` (§3, §6 "On-disk session layout").

use crate::error::ConfigError;
use crate::identity::SessionIdentity;
use std::path::{Path, PathBuf};

/// Host-level roots the layout is derived from (§2 `SystemConfiguration`,
/// consumed as an opaque struct upstream — only the fields the layout
/// needs are modeled here).
#[derive(Debug, Clone)]
pub struct SystemRoots {
    pub local_root: PathBuf,
    pub persistent_root: PathBuf,
    pub nas_root: PathBuf,
    pub server_root: PathBuf,
    pub mesoscope_pc_shared_root: PathBuf,
    pub mesoscope_pc_persistent_root: PathBuf,
}

/// Derived, per-session filesystem paths (§3). All persistent
/// subdirectories exist once `FilesystemLayout::create` returns; paths
/// are unique by session name.
#[derive(Debug, Clone)]
pub struct FilesystemLayout {
    pub raw_data: PathBuf,
    pub behavior_log: PathBuf,
    pub camera_data: PathBuf,
    pub mesoscope_data: PathBuf,
    pub persistent: PathBuf,
    pub nas_destination: PathBuf,
    pub server_destination: PathBuf,
    pub mesoscope_pc_shared: PathBuf,
    pub mesoscope_pc_persistent: PathBuf,
}

impl FilesystemLayout {
    /// Derives the layout from `roots` and `identity` and creates every
    /// persistent subdirectory.
    pub fn create(roots: &SystemRoots, identity: &SessionIdentity) -> Result<Self, ConfigError> {
        let session_dir = identity.session_dir_name();
        let project_animal = Path::new(&identity.project_name).join(&identity.animal_id);

        let raw_data = roots.local_root.join(&project_animal).join(&session_dir);
        let layout = Self {
            behavior_log: raw_data.join("behavior_data"),
            camera_data: raw_data.join("camera_data"),
            mesoscope_data: raw_data.join("mesoscope_data"),
            persistent: roots.persistent_root.join(&project_animal),
            nas_destination: roots.nas_root.join(&project_animal).join(&session_dir),
            server_destination: roots.server_root.join(&project_animal).join(&session_dir),
            mesoscope_pc_shared: roots.mesoscope_pc_shared_root.join("mesoscope_data"),
            mesoscope_pc_persistent: roots
                .mesoscope_pc_persistent_root
                .join(&project_animal),
            raw_data,
        };

        for dir in [
            &layout.raw_data,
            &layout.behavior_log,
            &layout.camera_data,
            &layout.mesoscope_data,
            &layout.persistent,
        ] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(layout)
    }

    pub fn session_data_yaml(&self) -> PathBuf {
        self.raw_data.join("session_data.yaml")
    }
    pub fn session_descriptor_yaml(&self) -> PathBuf {
        self.raw_data.join("session_descriptor.yaml")
    }
    pub fn hardware_state_yaml(&self) -> PathBuf {
        self.raw_data.join("hardware_state.yaml")
    }
    pub fn zaber_positions_yaml(&self) -> PathBuf {
        self.raw_data.join("zaber_positions.yaml")
    }
    pub fn mesoscope_positions_yaml(&self) -> PathBuf {
        self.raw_data.join("mesoscope_positions.yaml")
    }
    pub fn experiment_configuration_yaml(&self) -> PathBuf {
        self.raw_data.join("experiment_configuration.yaml")
    }
    /// Presence means "session is still being initialized" (§6).
    pub fn nk_marker(&self) -> PathBuf {
        self.raw_data.join("nk.bin")
    }
    /// Presence means "session is complete" (§6).
    pub fn telomere_marker(&self) -> PathBuf {
        self.raw_data.join("telomere.bin")
    }
    pub fn checksum_file(&self) -> PathBuf {
        self.raw_data.join("ax_checksum.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SessionType;
    use tempfile::TempDir;

    fn roots(tmp: &TempDir) -> SystemRoots {
        let base = tmp.path();
        SystemRoots {
            local_root: base.join("local"),
            persistent_root: base.join("persistent"),
            nas_root: base.join("nas"),
            server_root: base.join("server"),
            mesoscope_pc_shared_root: base.join("meso_shared"),
            mesoscope_pc_persistent_root: base.join("meso_persistent"),
        }
    }

    #[test]
    fn create_populates_every_persistent_subdirectory() {
        let tmp = TempDir::new().unwrap();
        let identity = SessionIdentity::new(
            "mesoscope_vr",
            "mouse_042",
            SessionType::Experiment,
            "1.0.0",
            "0.9.0",
        );
        let layout = FilesystemLayout::create(&roots(&tmp), &identity).unwrap();
        for dir in [
            &layout.raw_data,
            &layout.behavior_log,
            &layout.camera_data,
            &layout.mesoscope_data,
            &layout.persistent,
        ] {
            assert!(dir.is_dir(), "{dir:?} should exist");
        }
    }

    #[test]
    fn session_paths_are_unique_by_session_name() {
        let tmp = TempDir::new().unwrap();
        let r = roots(&tmp);
        let id_a = SessionIdentity::new(
            "mesoscope_vr",
            "mouse_042",
            SessionType::Experiment,
            "1.0.0",
            "0.9.0",
        );
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let id_b = SessionIdentity::new(
            "mesoscope_vr",
            "mouse_042",
            SessionType::Experiment,
            "1.0.0",
            "0.9.0",
        );
        let layout_a = FilesystemLayout::create(&r, &id_a).unwrap();
        let layout_b = FilesystemLayout::create(&r, &id_b).unwrap();
        assert_ne!(layout_a.raw_data, layout_b.raw_data);
    }
}
