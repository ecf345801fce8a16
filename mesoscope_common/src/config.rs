//! TOML configuration loading (§9 "injected logger capability" sibling:
//! an injected configuration capability with no module-level singleton).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Blanket-implemented loader for any TOML-deserializable configuration
/// struct. Mirrors the teacher crate's `ConfigLoader` trait so every
/// host-level config type gets `Type::load(path)` for free.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Log verbosity for `tracing-subscriber` env-filter defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_mqtt_broker() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

/// Host-level configuration consumed as an opaque struct by the engine
/// (§1 Out of scope: "YAML-backed session/project/experiment
/// configuration objects"). This is the one slice of it the in-scope
/// modules actually read: filesystem roots, the Unity broker address,
/// and the startup core-count gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfiguration {
    pub local_root: PathBuf,
    pub persistent_root: PathBuf,
    pub nas_root: PathBuf,
    pub server_root: PathBuf,
    pub mesoscope_pc_shared_root: PathBuf,
    pub mesoscope_pc_persistent_root: PathBuf,
    #[serde(default = "default_mqtt_broker")]
    pub unity_mqtt_broker: String,
    #[serde(default = "default_mqtt_port")]
    pub unity_mqtt_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub min_logical_cores_override: Option<usize>,
}

impl SystemConfiguration {
    pub fn roots(&self) -> crate::filesystem::SystemRoots {
        crate::filesystem::SystemRoots {
            local_root: self.local_root.clone(),
            persistent_root: self.persistent_root.clone(),
            nas_root: self.nas_root.clone(),
            server_root: self.server_root.clone(),
            mesoscope_pc_shared_root: self.mesoscope_pc_shared_root.clone(),
            mesoscope_pc_persistent_root: self.mesoscope_pc_persistent_root.clone(),
        }
    }

    pub fn min_logical_cores(&self) -> usize {
        self.min_logical_cores_override
            .unwrap_or(crate::consts::MIN_LOGICAL_CORES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_minimal_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("system.toml");
        std::fs::write(
            &path,
            r#"
local_root = "/data/local"
persistent_root = "/data/persistent"
nas_root = "/data/nas"
server_root = "/data/server"
mesoscope_pc_shared_root = "/meso/shared"
mesoscope_pc_persistent_root = "/meso/persistent"
"#,
        )
        .unwrap();

        let cfg = SystemConfiguration::load(&path).unwrap();
        assert_eq!(cfg.unity_mqtt_broker, "localhost");
        assert_eq!(cfg.unity_mqtt_port, 1883);
        assert_eq!(cfg.min_logical_cores(), crate::consts::MIN_LOGICAL_CORES);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = SystemConfiguration::load(Path::new("/nonexistent/system.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
