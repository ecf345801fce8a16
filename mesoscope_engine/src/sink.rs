//! Visualizer update capability (§2 item 8, §4.8.a/b/e "push to
//! visualizer"/"schedule a visualizer tick"). The engine never writes
//! to the Visualizer's transport directly; it calls through this
//! trait so the wire format stays the Visualizer crate's concern and
//! so tests can assert on pushed updates without a second process.

/// One Visualizer-facing update (§4.8.a running speed, §4.8.b
/// guidance/show-reward mirroring, §4.8.e valve/lick ticks, §4.9
/// run-training threshold pushes).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum VisualizerUpdate {
    RunningSpeed(f64),
    LickTick,
    ValveTick,
    GuidanceState(bool),
    ShowReward(bool),
    SpeedThreshold(f64),
    DurationThreshold(f64),
}

pub trait VisualizerSink: Send {
    fn push(&mut self, update: VisualizerUpdate);
}

/// No-op sink for sessions/tests that don't care about visualizer
/// traffic (e.g. window checking, which skips the runtime loop).
#[derive(Default)]
pub struct NullVisualizerSink;

impl VisualizerSink for NullVisualizerSink {
    fn push(&mut self, _update: VisualizerUpdate) {}
}

/// Records every pushed update in order, for tests that assert on
/// visualizer traffic (§8 "final threshold pair equals last value
/// pushed to the visualizer").
#[derive(Default)]
pub struct RecordingVisualizerSink {
    pub updates: Vec<VisualizerUpdate>,
}

impl VisualizerSink for RecordingVisualizerSink {
    fn push(&mut self, update: VisualizerUpdate) {
        self.updates.push(update);
    }
}

impl RecordingVisualizerSink {
    pub fn last_speed_threshold(&self) -> Option<f64> {
        self.updates.iter().rev().find_map(|u| match u {
            VisualizerUpdate::SpeedThreshold(v) => Some(*v),
            _ => None,
        })
    }

    pub fn last_duration_threshold(&self) -> Option<f64> {
        self.updates.iter().rev().find_map(|u| match u {
            VisualizerUpdate::DurationThreshold(v) => Some(*v),
            _ => None,
        })
    }
}

/// Transport sink for the out-of-process Visualizer (§2 item 8): appends
/// one JSON line per update to a feed file under the session's raw_data
/// directory. Grounded on [`mesoscope_shm::log_bus`]'s append-only
/// philosophy, but deliberately simpler — the Visualizer only ever needs
/// the latest value per series, not a replayable byte-exact log, so a
/// plain `File::write_all` under a shared lock is enough; no background
/// writer thread is warranted for this volume of traffic.
pub struct FileVisualizerSink {
    file: std::fs::File,
}

impl FileVisualizerSink {
    /// Creates (truncating) the feed file at `path`. The engine calls
    /// this once at startup before spawning the sibling Visualizer
    /// process, which then tails the same path.
    pub fn create(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }
}

impl VisualizerSink for FileVisualizerSink {
    fn push(&mut self, update: VisualizerUpdate) {
        use std::io::Write as _;
        let Ok(line) = serde_json::to_string(&update) else {
            return;
        };
        let _ = writeln!(self.file, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_tracks_last_thresholds() {
        let mut sink = RecordingVisualizerSink::default();
        sink.push(VisualizerUpdate::SpeedThreshold(1.0));
        sink.push(VisualizerUpdate::RunningSpeed(2.0));
        sink.push(VisualizerUpdate::SpeedThreshold(1.5));
        assert_eq!(sink.last_speed_threshold(), Some(1.5));
    }

    #[test]
    fn file_sink_appends_one_json_line_per_update() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("visualizer_feed.jsonl");
        let mut sink = FileVisualizerSink::create(&path).unwrap();
        sink.push(VisualizerUpdate::RunningSpeed(3.5));
        sink.push(VisualizerUpdate::LickTick);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            serde_json::from_str::<VisualizerUpdate>(lines[0]).unwrap(),
            VisualizerUpdate::RunningSpeed(3.5)
        );
        assert_eq!(
            serde_json::from_str::<VisualizerUpdate>(lines[1]).unwrap(),
            VisualizerUpdate::LickTick
        );
    }
}
