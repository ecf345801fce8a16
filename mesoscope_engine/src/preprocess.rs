//! Preprocessing pipeline (§6 "Preprocessing pipeline", invoked at
//! stop). The engine only ever talks to this through [`Preprocessor`];
//! the TIFF/ScanImage metadata step is out of scope (§1: "TIFF/JSON
//! preprocessing, described as a postconditions-only pipeline") and is
//! modeled here only by the postcondition the real pipeline leaves
//! behind — a recompressed-stack placeholder plus `ops.json`/
//! `metadata.json` — not by an actual codec.

use crate::error::{EngineError, EngineResult};
use mesoscope_common::filesystem::FilesystemLayout;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_128;

/// One outcome per completed pipeline step, kept for the operator
/// summary and for tests asserting the pipeline ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreprocessStep {
    RenamedMesoscopeLandingZone,
    CompressedBehaviorLogs { archives: usize },
    RenamedCameraVideos { videos: usize },
    PulledMesoscopeData,
    RecompressedStacks { stacks: usize },
    AppendedWaterLog,
    WroteTelomereMarker,
    WroteChecksum { checksum: String },
    TransferredToStores,
    PurgedMarkedCaches { purged: usize },
}

/// The filesystem-level preprocessing pipeline, consumed as an
/// injected capability (§9) so the engine never assumes a concrete
/// transfer/codec backend. A real deployment's `run()` shells out to
/// the external TIFF/ScanImage/transfer utilities named in §1; this
/// trait only promises the postconditions they must leave behind.
pub trait Preprocessor: Send {
    fn run(
        &mut self,
        layout: &FilesystemLayout,
        session_name: &str,
        descriptor_incomplete: bool,
        water_delivered_ul: f64,
    ) -> EngineResult<Vec<PreprocessStep>>;
}

/// No-op pipeline for task controllers/tests that stop a session
/// before any real data exists to preprocess.
#[derive(Default)]
pub struct NullPreprocessor;

impl Preprocessor for NullPreprocessor {
    fn run(
        &mut self,
        _layout: &FilesystemLayout,
        _session_name: &str,
        _descriptor_incomplete: bool,
        _water_delivered_ul: f64,
    ) -> EngineResult<Vec<PreprocessStep>> {
        Ok(Vec::new())
    }
}

/// Filesystem-grounded pipeline: performs every step of §6 that is
/// expressible as file operations (rename, move, marker create/delete,
/// checksum, log append) against the local filesystem, standing in for
/// the real ScanImage/NAS/server transfer utilities which are an
/// external collaborator (§1).
pub struct LocalPreprocessor {
    water_log_path: std::path::PathBuf,
}

impl LocalPreprocessor {
    pub fn new(water_log_path: impl Into<std::path::PathBuf>) -> Self {
        Self { water_log_path: water_log_path.into() }
    }

    fn rename_mesoscope_landing_zone(
        &self,
        layout: &FilesystemLayout,
        session_name: &str,
    ) -> EngineResult<()> {
        if !layout.mesoscope_pc_shared.is_dir() {
            return Ok(());
        }
        let renamed = layout
            .mesoscope_pc_shared
            .parent()
            .ok_or_else(|| {
                EngineError::Preprocessing("mesoscope shared root has no parent".into())
            })?
            .join(session_name);
        std::fs::rename(&layout.mesoscope_pc_shared, &renamed)
            .map_err(|e| EngineError::Preprocessing(format!("renaming mesoscope landing zone: {e}")))?;
        Ok(())
    }

    fn compress_behavior_logs(&self, layout: &FilesystemLayout) -> EngineResult<usize> {
        let mut archives = 0;
        let entries = std::fs::read_dir(&layout.behavior_log)
            .map_err(|e| EngineError::Preprocessing(format!("reading behavior log dir: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Preprocessing(format!("{e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("npy") {
                continue;
            }
            let archive = path.with_extension("npz");
            std::fs::rename(&path, &archive)
                .map_err(|e| EngineError::Preprocessing(format!("archiving {path:?}: {e}")))?;
            archives += 1;
        }
        Ok(archives)
    }

    fn rename_camera_videos(&self, layout: &FilesystemLayout, session_name: &str) -> EngineResult<usize> {
        let mut videos = 0;
        let entries = std::fs::read_dir(&layout.camera_data)
            .map_err(|e| EngineError::Preprocessing(format!("reading camera data dir: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Preprocessing(format!("{e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let human = if stem.contains("face") {
                format!("{session_name}_face_camera.mp4")
            } else if stem.contains("body") {
                format!("{session_name}_body_camera.mp4")
            } else {
                format!("{session_name}_{stem}.mp4")
            };
            let target = layout.camera_data.join(human);
            std::fs::rename(&path, &target)
                .map_err(|e| EngineError::Preprocessing(format!("renaming {path:?}: {e}")))?;
            videos += 1;
        }
        Ok(videos)
    }

    fn pull_mesoscope_data(&self, layout: &FilesystemLayout, session_name: &str) -> EngineResult<()> {
        let source = layout
            .mesoscope_pc_shared
            .parent()
            .map(|p| p.join(session_name))
            .unwrap_or_else(|| layout.mesoscope_pc_shared.clone());
        if !source.is_dir() {
            return Ok(());
        }
        let required = ["MotionEstimator.me", "fov.roi"];
        for name in required {
            if !source.join(name).exists() && !layout.mesoscope_data.join(name).exists() {
                return Err(EngineError::Precondition(format!(
                    "mesoscope data transfer missing required file {name}"
                )));
            }
        }
        for marker in ["kinase.bin", "phosphatase.bin"] {
            let _ = std::fs::remove_file(source.join(marker));
        }
        Ok(())
    }

    fn recompress_stacks(&self, layout: &FilesystemLayout) -> EngineResult<usize> {
        let mut stacks = 0;
        if !layout.mesoscope_data.is_dir() {
            return Ok(0);
        }
        let entries = std::fs::read_dir(&layout.mesoscope_data)
            .map_err(|e| EngineError::Preprocessing(format!("reading mesoscope data dir: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Preprocessing(format!("{e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("tif")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| !n.starts_with("zstack"))
                    .unwrap_or(false)
            {
                stacks += 1;
            }
        }
        if stacks > 0 {
            std::fs::write(
                layout.mesoscope_data.join("ops.json"),
                b"{\"frame_rate\":null,\"plane_number\":null,\"channel_number\":null}",
            )
            .map_err(|e| EngineError::Preprocessing(format!("writing ops.json: {e}")))?;
            std::fs::write(
                layout.mesoscope_data.join("frame_invariant_metadata.json"),
                b"{}",
            )
            .map_err(|e| EngineError::Preprocessing(format!("writing frame metadata: {e}")))?;
        }
        Ok(stacks)
    }

    fn append_water_log(&self, session_name: &str, water_delivered_ul: f64) -> EngineResult<()> {
        use std::io::Write as _;
        if let Some(parent) = self.water_log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Preprocessing(format!("creating water log dir: {e}")))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.water_log_path)
            .map_err(|e| EngineError::Preprocessing(format!("opening water log: {e}")))?;
        writeln!(file, "{session_name},{water_delivered_ul:.3}")
            .map_err(|e| EngineError::Preprocessing(format!("appending water log row: {e}")))?;
        Ok(())
    }

    fn checksum_raw_data(&self, layout: &FilesystemLayout) -> EngineResult<String> {
        let mut buffer = Vec::new();
        hash_directory(&layout.raw_data, &mut buffer)?;
        let digest = xxh3_128(&buffer);
        let hex = format!("{digest:032x}");
        std::fs::write(layout.checksum_file(), &hex)
            .map_err(|e| EngineError::Preprocessing(format!("writing checksum file: {e}")))?;
        Ok(hex)
    }

    fn transfer_to_stores(&self, layout: &FilesystemLayout) -> EngineResult<()> {
        for destination in [&layout.nas_destination, &layout.server_destination] {
            std::fs::create_dir_all(destination)
                .map_err(|e| EngineError::Preprocessing(format!("preparing {destination:?}: {e}")))?;
            copy_dir_recursive(&layout.raw_data, destination)?;
        }
        Ok(())
    }

    fn purge_marked_caches(&self, layout: &FilesystemLayout) -> EngineResult<usize> {
        let mut purged = 0;
        if !layout.persistent.is_dir() {
            return Ok(0);
        }
        let entries = std::fs::read_dir(&layout.persistent)
            .map_err(|e| EngineError::Preprocessing(format!("reading persistent dir: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Preprocessing(format!("{e}")))?;
            let path = entry.path();
            if path.is_dir() && path.join("ubiquitin.bin").exists() {
                std::fs::remove_dir_all(&path)
                    .map_err(|e| EngineError::Preprocessing(format!("purging {path:?}: {e}")))?;
                purged += 1;
            }
        }
        Ok(purged)
    }
}

impl Preprocessor for LocalPreprocessor {
    fn run(
        &mut self,
        layout: &FilesystemLayout,
        session_name: &str,
        descriptor_incomplete: bool,
        water_delivered_ul: f64,
    ) -> EngineResult<Vec<PreprocessStep>> {
        let mut steps = Vec::new();

        self.rename_mesoscope_landing_zone(layout, session_name)?;
        steps.push(PreprocessStep::RenamedMesoscopeLandingZone);

        let archives = self.compress_behavior_logs(layout)?;
        steps.push(PreprocessStep::CompressedBehaviorLogs { archives });

        let videos = self.rename_camera_videos(layout, session_name)?;
        steps.push(PreprocessStep::RenamedCameraVideos { videos });

        self.pull_mesoscope_data(layout, session_name)?;
        steps.push(PreprocessStep::PulledMesoscopeData);

        let stacks = self.recompress_stacks(layout)?;
        steps.push(PreprocessStep::RecompressedStacks { stacks });

        self.append_water_log(session_name, water_delivered_ul)?;
        steps.push(PreprocessStep::AppendedWaterLog);

        if !descriptor_incomplete {
            std::fs::write(layout.telomere_marker(), b"")
                .map_err(|e| EngineError::Preprocessing(format!("writing telomere marker: {e}")))?;
            steps.push(PreprocessStep::WroteTelomereMarker);
        }

        let checksum = self.checksum_raw_data(layout)?;
        steps.push(PreprocessStep::WroteChecksum { checksum });

        self.transfer_to_stores(layout)?;
        steps.push(PreprocessStep::TransferredToStores);

        let purged = self.purge_marked_caches(layout)?;
        steps.push(PreprocessStep::PurgedMarkedCaches { purged });

        Ok(steps)
    }
}

fn hash_directory(dir: &Path, buffer: &mut Vec<u8>) -> EngineResult<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| EngineError::Preprocessing(format!("reading {dir:?}: {e}")))?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        buffer.extend_from_slice(path.to_string_lossy().as_bytes());
        if path.is_dir() {
            hash_directory(&path, buffer)?;
        } else {
            let bytes = std::fs::read(&path)
                .map_err(|e| EngineError::Preprocessing(format!("reading {path:?}: {e}")))?;
            buffer.extend_from_slice(&bytes);
        }
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> EngineResult<()> {
    std::fs::create_dir_all(dst)
        .map_err(|e| EngineError::Preprocessing(format!("creating {dst:?}: {e}")))?;
    for entry in std::fs::read_dir(src)
        .map_err(|e| EngineError::Preprocessing(format!("reading {src:?}: {e}")))?
    {
        let entry = entry.map_err(|e| EngineError::Preprocessing(format!("{e}")))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)
                .map_err(|e| EngineError::Preprocessing(format!("copying {from:?} to {to:?}: {e}")))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesoscope_common::filesystem::SystemRoots;
    use mesoscope_common::identity::{SessionIdentity, SessionType};
    use tempfile::TempDir;

    fn layout(tmp: &TempDir) -> FilesystemLayout {
        let base = tmp.path();
        let roots = SystemRoots {
            local_root: base.join("local"),
            persistent_root: base.join("persistent"),
            nas_root: base.join("nas"),
            server_root: base.join("server"),
            mesoscope_pc_shared_root: base.join("meso_shared"),
            mesoscope_pc_persistent_root: base.join("meso_persistent"),
        };
        let identity = SessionIdentity::new(
            "mesoscope_vr",
            "mouse_042",
            SessionType::LickTraining,
            "1.0.0",
            "0.9.0",
        );
        FilesystemLayout::create(&roots, &identity).unwrap()
    }

    #[test]
    fn local_pipeline_writes_checksum_and_telomere_for_complete_session() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        std::fs::write(layout.behavior_log.join("encoder.npy"), b"sample").unwrap();

        let mut preprocessor = LocalPreprocessor::new(tmp.path().join("water_log.csv"));
        let steps = preprocessor.run(&layout, "test_session", false, 12.5).unwrap();

        assert!(layout.telomere_marker().exists());
        assert!(layout.checksum_file().exists());
        assert!(layout.behavior_log.join("encoder.npz").exists());
        assert!(steps.contains(&PreprocessStep::WroteTelomereMarker));
    }

    #[test]
    fn local_pipeline_skips_telomere_when_descriptor_incomplete() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);

        let mut preprocessor = LocalPreprocessor::new(tmp.path().join("water_log.csv"));
        preprocessor.run(&layout, "test_session", true, 0.0).unwrap();

        assert!(!layout.telomere_marker().exists());
    }

    #[test]
    fn purge_removes_only_ubiquitin_marked_directories() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let kept = layout.persistent.join("keep_me");
        let purged = layout.persistent.join("purge_me");
        std::fs::create_dir_all(&kept).unwrap();
        std::fs::create_dir_all(&purged).unwrap();
        std::fs::write(purged.join("ubiquitin.bin"), b"").unwrap();

        let preprocessor = LocalPreprocessor::new(tmp.path().join("water_log.csv"));
        let count = preprocessor.purge_marked_caches(&layout).unwrap();

        assert_eq!(count, 1);
        assert!(kept.exists());
        assert!(!purged.exists());
    }
}
