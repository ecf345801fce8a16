//! # Session Runner Integration Tests
//!
//! The CLI's own logic is mostly thin plumbing over `mesoscope_common`
//! and `mesoscope_engine`, so these tests focus on the two properties
//! specific to this crate: `FilesystemLayout::create` idempotency (the
//! CLI calls it once to precompute sibling-process paths, then again
//! inside `run_session`) and the directory-marker scheme `sl-get
//! list-sessions` classifies sessions by.

use mesoscope_common::filesystem::{FilesystemLayout, SystemRoots};
use mesoscope_common::identity::{SessionIdentity, SessionType};

fn roots(base: &std::path::Path) -> SystemRoots {
    SystemRoots {
        local_root: base.join("local"),
        persistent_root: base.join("persistent"),
        nas_root: base.join("nas"),
        server_root: base.join("server"),
        mesoscope_pc_shared_root: base.join("mesoscope_shared"),
        mesoscope_pc_persistent_root: base.join("mesoscope_persistent"),
    }
}

/// The CLI computes `control_vector.shm` / `visualizer_feed.jsonl`
/// paths by calling `FilesystemLayout::create` before `run_session`
/// calls it again during startup. Both calls must land on the same
/// `raw_data` directory with no duplicate-creation error.
#[test]
fn filesystem_layout_create_is_idempotent_for_sibling_path_precompute() {
    let tmp = tempfile::tempdir().unwrap();
    let roots = roots(tmp.path());
    let identity = SessionIdentity::new("demo_project", "mouse_07", SessionType::RunTraining, "0.1.0", "0.1.0");

    let first = FilesystemLayout::create(&roots, &identity).unwrap();
    let second = FilesystemLayout::create(&roots, &identity).unwrap();

    assert_eq!(first.raw_data, second.raw_data);
    assert!(first.raw_data.is_dir());
    assert!(first.persistent.is_dir());
}

/// Reimplements the classification `get_list_sessions` prints, against
/// the marker files `LocalPreprocessor`/`startup` actually write
/// (`nk.bin` at session creation, `telomere.bin` on a clean stop).
fn classify(dir: &std::path::Path) -> &'static str {
    if dir.join("nk.bin").exists() {
        "initializing"
    } else if dir.join("telomere.bin").exists() {
        "complete"
    } else {
        "incomplete"
    }
}

#[test]
fn session_status_follows_marker_files() {
    let tmp = tempfile::tempdir().unwrap();

    let fresh = tmp.path().join("fresh");
    std::fs::create_dir_all(&fresh).unwrap();
    std::fs::write(fresh.join("nk.bin"), b"").unwrap();
    assert_eq!(classify(&fresh), "initializing");

    let done = tmp.path().join("done");
    std::fs::create_dir_all(&done).unwrap();
    std::fs::write(done.join("telomere.bin"), b"").unwrap();
    assert_eq!(classify(&done), "complete");

    let crashed = tmp.path().join("crashed");
    std::fs::create_dir_all(&crashed).unwrap();
    assert_eq!(classify(&crashed), "incomplete");
}

/// A session directory with both markers (e.g. a telomere written by a
/// stale retry before `nk.bin` was cleaned up) reports `initializing`:
/// the CLI treats the in-progress marker as authoritative.
#[test]
fn initializing_marker_takes_precedence_over_complete() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("both");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("nk.bin"), b"").unwrap();
    std::fs::write(dir.join("telomere.bin"), b"").unwrap();
    assert_eq!(classify(&dir), "initializing");
}
