//! Video Subsystem façade (§2 item 4, §5): camera pipelines with a
//! producer thread acquiring frames and a consumer thread encoding
//! them, each logging frame-arrival timestamps to the log bus.
//!
//! Per §5's worker count ("Four camera workers — two producers (face,
//! body×2 share one producer each) and their encoders"), the face
//! camera and the two body cameras are each served by one producer
//! thread; the body producer round-robins across its two physical
//! sources. Each producer has its own encoder thread, for four workers
//! total.

use crate::error::HalResult;
use mesoscope_shm::LogBusHandle;
use openh264::encoder::{Encoder, EncoderConfig};
use openh264::formats::YUVBuffer;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Log source id reserved for the face (scientific) camera pipeline.
pub const LOG_SOURCE_FACE_CAMERA: u8 = 10;
/// Log source id reserved for the shared body-camera pipeline.
pub const LOG_SOURCE_BODY_CAMERA: u8 = 11;

/// One raw acquired frame, already in I420 (YUV 4:2:0) planar layout.
pub struct RawFrame {
    pub camera_id: u8,
    pub width: usize,
    pub height: usize,
    pub yuv: Vec<u8>,
}

/// A physical or simulated frame acquisition source.
pub trait FrameSource: Send {
    fn camera_id(&self) -> u8;
    /// Blocks (respecting its own frame-rate pacing) until the next
    /// frame is available, or returns `None` once the source is done.
    fn next_frame(&mut self) -> Option<RawFrame>;
}

/// Simulated acquisition source standing in for a physical camera
/// (grounded on the teacher's `drivers::simulation` pattern): emits
/// solid-gray frames at a fixed interval.
pub struct SimulatedFrameSource {
    camera_id: u8,
    width: usize,
    height: usize,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl SimulatedFrameSource {
    pub fn new(camera_id: u8, width: usize, height: usize, fps: f64, running: Arc<AtomicBool>) -> Self {
        Self {
            camera_id,
            width,
            height,
            interval: Duration::from_secs_f64(1.0 / fps),
            running,
        }
    }
}

impl FrameSource for SimulatedFrameSource {
    fn camera_id(&self) -> u8 {
        self.camera_id
    }

    fn next_frame(&mut self) -> Option<RawFrame> {
        if !self.running.load(Ordering::Acquire) {
            return None;
        }
        std::thread::sleep(self.interval);
        let plane_size = self.width * self.height + self.width * self.height / 2;
        Some(RawFrame {
            camera_id: self.camera_id,
            width: self.width,
            height: self.height,
            yuv: vec![128u8; plane_size],
        })
    }
}

struct PipelineFrame {
    frame: RawFrame,
}

/// Live handle to a spawned camera pipeline (one producer + one
/// encoder thread).
pub struct CameraPipeline {
    name: String,
    running: Arc<AtomicBool>,
    saving: Arc<AtomicBool>,
    producer: Option<std::thread::JoinHandle<()>>,
    encoder: Option<std::thread::JoinHandle<()>>,
}

impl CameraPipeline {
    /// Spawns the producer and encoder threads. Matches §6 startup
    /// step 6 ("Start all cameras (acquisition only, saving
    /// disabled)"): frames are acquired immediately but not written to
    /// `output_path` until `enable_saving()` is called.
    pub fn spawn(
        name: impl Into<String>,
        mut sources: Vec<Box<dyn FrameSource>>,
        output_path: PathBuf,
        log_source_id: u8,
        log_bus: LogBusHandle,
    ) -> HalResult<Self> {
        let name = name.into();
        let running = Arc::new(AtomicBool::new(true));
        let saving = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = crossbeam_channel::unbounded::<PipelineFrame>();

        let producer_running = Arc::clone(&running);
        let producer_log_bus = log_bus;
        let producer = std::thread::Builder::new()
            .name(format!("mesoscope-{name}-producer"))
            .spawn(move || {
                let mut index = 0usize;
                while producer_running.load(Ordering::Acquire) {
                    if sources.is_empty() {
                        break;
                    }
                    let source = &mut sources[index % sources.len()];
                    index += 1;
                    match source.next_frame() {
                        Some(frame) => {
                            let t_us = producer_log_bus.now_us();
                            producer_log_bus.put(log_source_id, t_us, &frame.camera_id.to_le_bytes());
                            if sender.send(PipelineFrame { frame }).is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            })
            .expect("failed to spawn camera producer thread");

        let encoder_saving = Arc::clone(&saving);
        let encoder_name = name.clone();
        let encoder = std::thread::Builder::new()
            .name(format!("mesoscope-{encoder_name}-encoder"))
            .spawn(move || {
                let mut file: Option<File> = None;
                let mut h264 = match Encoder::with_api_config(
                    openh264::OpenH264API::from_source(),
                    EncoderConfig::new(),
                ) {
                    Ok(encoder) => Some(encoder),
                    Err(err) => {
                        tracing::warn!(pipeline = %encoder_name, error = %err, "failed to initialize H.264 encoder");
                        None
                    }
                };

                while let Ok(item) = receiver.recv() {
                    if !encoder_saving.load(Ordering::Acquire) {
                        continue;
                    }
                    let Some(encoder) = h264.as_mut() else { continue };
                    let yuv = YUVBuffer::with_size(item.frame.width, item.frame.height);
                    let bitstream = match encoder.encode(&yuv) {
                        Ok(bitstream) => bitstream,
                        Err(err) => {
                            tracing::warn!(pipeline = %encoder_name, error = %err, "frame encode failed");
                            continue;
                        }
                    };
                    let sink = file.get_or_insert_with(|| {
                        File::create(&output_path)
                            .unwrap_or_else(|err| panic!("failed to create {output_path:?}: {err}"))
                    });
                    let _ = sink.write_all(&bitstream.to_vec());
                }
            })
            .expect("failed to spawn camera encoder thread");

        Ok(Self { name, running, saving, producer: Some(producer), encoder: Some(encoder) })
    }

    /// Step 11 of startup (§6): "Begin saving camera frames."
    pub fn enable_saving(&self) {
        self.saving.store(true, Ordering::Release);
    }

    pub fn disable_saving(&self) {
        self.saving.store(false, Ordering::Release);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the producer and drains the encoder before returning.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(producer) = self.producer.take() {
            let _ = producer.join();
        }
        if let Some(encoder) = self.encoder.take() {
            let _ = encoder.join();
        }
    }
}

/// Owns the face and body camera pipelines for one session (§2 item 4).
pub struct VideoSubsystem {
    pub face: CameraPipeline,
    pub body: CameraPipeline,
}

impl VideoSubsystem {
    pub fn enable_saving(&self) {
        self.face.enable_saving();
        self.body.enable_saving();
    }

    pub fn disable_saving(&self) {
        self.face.disable_saving();
        self.body.disable_saving();
    }

    pub fn stop(self) {
        self.face.stop();
        self.body.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesoscope_shm::LogBus;
    use tempfile::TempDir;

    #[test]
    fn pipeline_logs_frame_arrivals_while_stopped_from_saving() {
        let tmp = TempDir::new().unwrap();
        let bus = LogBus::start(tmp.path().join("log")).unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let source: Box<dyn FrameSource> =
            Box::new(SimulatedFrameSource::new(1, 4, 4, 200.0, Arc::clone(&running)));

        let pipeline = CameraPipeline::spawn(
            "face",
            vec![source],
            tmp.path().join("face.mp4"),
            LOG_SOURCE_FACE_CAMERA,
            bus.handle(),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::Release);
        pipeline.stop();
        bus.stop().unwrap();

        let bytes = std::fs::read(tmp.path().join("log").join(format!(
            "source_{LOG_SOURCE_FACE_CAMERA}.log"
        )))
        .unwrap();
        assert!(!bytes.is_empty(), "producer must log at least one frame arrival");
    }
}
