//! Tracker primitives (spec §3, §9): fixed-layout atomic numeric cells
//! owned by the module interface that writes them, published by `Arc`
//! handle to every reader (engine, visualizer). No serialization or
//! locking on the hot path; every tracker has exactly one writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single `f64` cell with atomic load/store/fetch_add, backed by an
/// `AtomicU64` holding the value's bit pattern.
#[derive(Debug, Default)]
pub struct AtomicF64Cell(AtomicU64);

impl AtomicF64Cell {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Atomically adds `delta` and returns the new value.
    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = f64::from_bits(current) + delta;
            match self.0.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

/// `EncoderTracker[f64;2]`: (cumulative_distance_cm, absolute_position_unity).
///
/// Written by the encoder module interface on every CCW/CW event;
/// read by the engine's data cycle as a pair (§4.8.a). Readers tolerate
/// transient inconsistency between the two fields within a cycle.
#[derive(Debug, Default)]
pub struct EncoderTracker {
    pub distance_cm: AtomicF64Cell,
    pub position_unity: AtomicF64Cell,
}

impl EncoderTracker {
    pub fn handle() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reads both fields as a pair in one call (§5: "engine reads them
    /// within a single cycle before acting").
    pub fn snapshot(&self) -> (f64, f64) {
        (self.distance_cm.load(), self.position_unity.load())
    }

    pub fn reset(&self) {
        self.distance_cm.store(0.0);
        self.position_unity.store(0.0);
    }
}

/// `LickTracker[u64;1]`: monotonic lick count.
#[derive(Debug, Default)]
pub struct LickTracker {
    pub licks: AtomicU64,
}

impl LickTracker {
    pub fn handle() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn increment(&self) -> u64 {
        self.licks.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn load(&self) -> u64 {
        self.licks.load(Ordering::Acquire)
    }
}

/// `ValveTracker[f64;1]`: cumulative microliters dispensed, computed by
/// timing open→close intervals and applying `A * t^B` (§4.2).
#[derive(Debug, Default)]
pub struct ValveTracker {
    pub dispensed_ul: AtomicF64Cell,
}

impl ValveTracker {
    pub fn handle() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_volume(&self, volume_ul: f64) -> f64 {
        self.dispensed_ul.fetch_add(volume_ul)
    }

    pub fn load(&self) -> f64 {
        self.dispensed_ul.load()
    }
}

/// `MesoscopePulseTracker[u64;1]`: rising-edge count since last reset.
#[derive(Debug, Default)]
pub struct MesoscopePulseTracker {
    pub pulses: AtomicU64,
}

impl MesoscopePulseTracker {
    pub fn handle() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn increment(&self) -> u64 {
        self.pulses.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn load(&self) -> u64 {
        self.pulses.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.pulses.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_tracker_accumulates_independently() {
        let t = EncoderTracker::handle();
        t.distance_cm.fetch_add(12.5);
        t.position_unity.fetch_add(-3.0);
        assert_eq!(t.snapshot(), (12.5, -3.0));
        t.reset();
        assert_eq!(t.snapshot(), (0.0, 0.0));
    }

    #[test]
    fn lick_tracker_is_monotonic() {
        let t = LickTracker::handle();
        assert_eq!(t.increment(), 1);
        assert_eq!(t.increment(), 2);
        assert_eq!(t.load(), 2);
    }

    #[test]
    fn valve_tracker_never_decreases() {
        let t = ValveTracker::handle();
        t.add_volume(5.0);
        let after = t.add_volume(3.2);
        assert!((after - 8.2).abs() < 1e-9);
        assert!(t.load() >= 8.0);
    }

    #[test]
    fn mesoscope_pulse_tracker_resets() {
        let t = MesoscopePulseTracker::handle();
        t.increment();
        t.increment();
        assert_eq!(t.load(), 2);
        t.reset();
        assert_eq!(t.load(), 0);
    }
}
