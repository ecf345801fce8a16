//! Clock & Log Bus (spec §4.1): a monotonic microsecond timer anchored
//! to a UTC epoch stamp taken at startup, and a single-producer-many-
//! writers append-only log stream keyed by `(source_id, t_us, bytes)`.
//!
//! Grounded on the crossbeam-channel MPSC pattern: every interface
//! channel thread holds a cheap `LogBusHandle` clone and enqueues
//! records without blocking; one background thread drains the channel
//! and appends to per-source sharded files.

use crate::error::{ShmError, ShmResult};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Sender, TryRecvError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Engine-reserved source id for its own tagged control records (§4.1, §4.8.g).
pub const LOG_SOURCE_ENGINE: u8 = 1;

struct Record {
    source_id: u8,
    t_us: u64,
    payload: Vec<u8>,
}

/// Non-blocking producer handle. Cheap to clone; every microcontroller
/// channel and camera pipeline holds one.
#[derive(Clone)]
pub struct LogBusHandle {
    sender: Sender<Record>,
    onset: Instant,
    stopped: Arc<AtomicBool>,
}

impl LogBusHandle {
    /// Monotonic microseconds since `onset()`.
    pub fn now_us(&self) -> u64 {
        self.onset.elapsed().as_micros() as u64
    }

    /// Non-blocking enqueue (§4.1). Silently drops the record if the
    /// bus has already been stopped — producers must not block or
    /// panic on a race with shutdown.
    pub fn put(&self, source_id: u8, t_us: u64, bytes: &[u8]) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let _ = self.sender.send(Record {
            source_id,
            t_us,
            payload: bytes.to_vec(),
        });
    }
}

/// Owns the writer thread and the send side used to construct handles.
/// Only the session engine holds a `LogBus`; every other producer gets
/// a `LogBusHandle`.
pub struct LogBus {
    sender: Sender<Record>,
    onset: Instant,
    stopped: Arc<AtomicBool>,
    writer: Option<std::thread::JoinHandle<()>>,
}

impl LogBus {
    /// Starts the writer thread, sharding records into `<dir>/source_<id>.log`.
    /// Each per-source file holds consecutive `(t_us: u64 LE, len: u32 LE, payload)` records.
    pub fn start(dir: impl Into<PathBuf>) -> ShmResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let (sender, receiver) = crossbeam_channel::unbounded::<Record>();
        let stopped = Arc::new(AtomicBool::new(false));
        let writer_stopped = Arc::clone(&stopped);

        let writer = std::thread::Builder::new()
            .name("log-bus-writer".to_string())
            .spawn(move || {
                let mut files: std::collections::HashMap<u8, std::fs::File> =
                    std::collections::HashMap::new();
                loop {
                    match receiver.recv() {
                        Ok(record) => {
                            write_record(&dir, &mut files, &record);
                        }
                        Err(_) => break,
                    }
                    // Drain anything else queued before checking for stop,
                    // so onset/control records never get reordered behind
                    // a late-arriving `stop()` signal.
                    loop {
                        match receiver.try_recv() {
                            Ok(record) => write_record(&dir, &mut files, &record),
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => {
                                writer_stopped.store(true, Ordering::Release);
                                return;
                            }
                        }
                    }
                }
                writer_stopped.store(true, Ordering::Release);
            })
            .expect("failed to spawn log bus writer thread");

        Ok(Self {
            sender,
            onset: Instant::now(),
            stopped,
            writer: Some(writer),
        })
    }

    /// Called once at startup: writes the UTC anchor record with
    /// `source_id = LOG_SOURCE_ENGINE`, `t = 0` (§4.1).
    pub fn onset(&self) -> DateTime<Utc> {
        let wall_utc = Utc::now();
        let anchor_bytes = wall_utc.timestamp_micros().to_le_bytes();
        self.handle().put(LOG_SOURCE_ENGINE, 0, &anchor_bytes);
        wall_utc
    }

    pub fn handle(&self) -> LogBusHandle {
        LogBusHandle {
            sender: self.sender.clone(),
            onset: self.onset,
            stopped: Arc::clone(&self.stopped),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.onset.elapsed().as_micros() as u64
    }

    pub fn put(&self, source_id: u8, t_us: u64, bytes: &[u8]) {
        self.handle().put(source_id, t_us, bytes);
    }

    /// Flushes, closes, and makes the archive safe to read (§4.1).
    pub fn stop(mut self) -> ShmResult<()> {
        self.stop_mut()
    }

    fn stop_mut(&mut self) -> ShmResult<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Dropping the owning sender (kept alongside every handle clone
        // until this point) lets the writer thread's `recv()` observe
        // disconnection and exit once the channel drains.
        drop(std::mem::replace(
            &mut self.sender,
            crossbeam_channel::unbounded().0,
        ));
        if let Some(writer) = self.writer.take() {
            writer.join().map_err(|_| ShmError::BusStopped)?;
        }
        Ok(())
    }
}

impl Drop for LogBus {
    fn drop(&mut self) {
        let _ = self.stop_mut();
    }
}

fn write_record(
    dir: &Path,
    files: &mut std::collections::HashMap<u8, std::fs::File>,
    record: &Record,
) {
    let file = files.entry(record.source_id).or_insert_with(|| {
        let path = dir.join(format!("source_{}.log", record.source_id));
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("failed to open per-source log bus shard")
    });
    let _ = file.write_all(&record.t_us.to_le_bytes());
    let _ = file.write_all(&(record.payload.len() as u32).to_le_bytes());
    let _ = file.write_all(&record.payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn onset_writes_one_record_from_engine_source() {
        let tmp = TempDir::new().unwrap();
        let bus = LogBus::start(tmp.path()).unwrap();
        bus.onset();
        bus.stop().unwrap();

        let path = tmp.path().join(format!("source_{}.log", LOG_SOURCE_ENGINE));
        let bytes = std::fs::read(path).unwrap();
        // t_us(8) + len(4) + payload(8 for an i64 timestamp)
        assert_eq!(bytes.len(), 8 + 4 + 8);
        assert_eq!(&bytes[0..8], &0u64.to_le_bytes());
    }

    #[test]
    fn records_per_source_preserve_order() {
        let tmp = TempDir::new().unwrap();
        let bus = LogBus::start(tmp.path()).unwrap();
        let handle = bus.handle();
        for t in 0..50u64 {
            handle.put(7, t, &t.to_le_bytes());
        }
        bus.stop().unwrap();

        let bytes = std::fs::read(tmp.path().join("source_7.log")).unwrap();
        let mut offset = 0;
        let mut last_t = None;
        while offset < bytes.len() {
            let t = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
            offset += 8;
            let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            offset += len;
            if let Some(prev) = last_t {
                assert!(t >= prev, "records per source must be non-decreasing in t");
            }
            last_t = Some(t);
        }
        assert_eq!(last_t, Some(49));
    }
}
