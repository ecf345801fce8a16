//! # Visualizer
//!
//! Runs as its own process, tailing the JSON-lines feed the engine
//! writes through [`mesoscope_engine::sink::FileVisualizerSink`]
//! (spec §2 item 8). Holds no state the engine depends on; if this
//! process dies and restarts it just resumes rendering from whatever
//! line the feed file is currently at.

use clap::Parser;
use mesoscope_engine::sink::VisualizerUpdate;
use std::io::{BufRead, Seek};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mesoscope_visualizer")]
#[command(author = "Sun Lab")]
#[command(version)]
#[command(about = "Tails a session's visualizer update feed and renders a live summary")]
struct Args {
    /// Path to the session's `visualizer_feed.jsonl`, created by the
    /// engine under `<raw_data>/visualizer_feed.jsonl`.
    #[arg(short, long)]
    feed: String,

    /// Poll interval while waiting for new lines, in milliseconds.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}

#[derive(Default)]
struct Dashboard {
    running_speed_cm_s: f64,
    speed_threshold_cm_s: f64,
    duration_threshold_ms: f64,
    guidance_enabled: bool,
    show_reward: bool,
    licks: u64,
    rewards: u64,
}

impl Dashboard {
    fn apply(&mut self, update: VisualizerUpdate) {
        match update {
            VisualizerUpdate::RunningSpeed(v) => self.running_speed_cm_s = v,
            VisualizerUpdate::SpeedThreshold(v) => self.speed_threshold_cm_s = v,
            VisualizerUpdate::DurationThreshold(v) => self.duration_threshold_ms = v,
            VisualizerUpdate::GuidanceState(on) => self.guidance_enabled = on,
            VisualizerUpdate::ShowReward(on) => self.show_reward = on,
            VisualizerUpdate::LickTick => self.licks += 1,
            VisualizerUpdate::ValveTick => self.rewards += 1,
        }
    }

    fn render(&self) {
        println!(
            "speed={:>6.2} cm/s  thresholds=({:>5.2} cm/s, {:>6.1} ms)  guidance={}  show_reward={}  licks={}  rewards={}",
            self.running_speed_cm_s,
            self.speed_threshold_cm_s,
            self.duration_threshold_ms,
            self.guidance_enabled,
            self.show_reward,
            self.licks,
            self.rewards,
        );
    }
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let args = Args::parse();

    let mut file = loop {
        match std::fs::File::open(&args.feed) {
            Ok(f) => break f,
            Err(_) => {
                warn!("waiting for visualizer feed at {}", args.feed);
                std::thread::sleep(Duration::from_millis(args.poll_ms));
            }
        }
    };
    info!("Visualizer attached to {}", args.feed);

    let mut dashboard = Dashboard::default();
    let mut offset: u64 = 0;

    loop {
        let mut reader = std::io::BufReader::new(&file);
        let mut line = String::new();
        let mut advanced = false;
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(n) => {
                    offset += n as u64;
                    advanced = true;
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<VisualizerUpdate>(trimmed) {
                        Ok(update) => dashboard.apply(update),
                        Err(e) => warn!("malformed visualizer update {trimmed:?}: {e}"),
                    }
                }
                Err(e) => {
                    warn!("reading visualizer feed: {e}");
                    break;
                }
            }
        }

        if advanced {
            dashboard.render();
        }

        std::thread::sleep(Duration::from_millis(args.poll_ms));
        // Re-seek so a slow writer's later `write_all` is picked up even
        // though `BufReader` may have buffered past EOF.
        let _ = file.seek(std::io::SeekFrom::Start(offset));
    }
}
