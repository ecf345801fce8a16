//! Control UI shared integer vector (spec §4.6).
//!
//! The engine and the UI process share a fixed-length vector of signed
//! 64-bit cells over real cross-process shared memory; each index has a
//! single designated writer by convention (the UI for one-shot signals
//! and modifiers, either side for the two bidirectional indices).

use crate::error::{ShmError, ShmResult};
use crate::platform::{attach_segment_mmap, create_segment_mmap};
use memmap2::MmapMut;
use std::sync::atomic::{AtomicI64, Ordering};

/// Number of indexed cells in the control vector (§4.6).
pub const CONTROL_VECTOR_LEN: usize = 11;

pub const IDX_TERMINATION: usize = 0;
pub const IDX_EXIT_SIGNAL: usize = 1;
pub const IDX_REWARD_SIGNAL: usize = 2;
pub const IDX_SPEED_MODIFIER: usize = 3;
pub const IDX_DURATION_MODIFIER: usize = 4;
pub const IDX_PAUSE_STATE: usize = 5;
pub const IDX_OPEN_VALVE: usize = 6;
pub const IDX_CLOSE_VALVE: usize = 7;
pub const IDX_REWARD_VOLUME: usize = 8;
pub const IDX_GUIDANCE_ENABLED: usize = 9;
pub const IDX_SHOW_REWARD: usize = 10;

const CELL_BYTES: usize = std::mem::size_of::<i64>();
const SEGMENT_BYTES: usize = CONTROL_VECTOR_LEN * CELL_BYTES;

/// Shared control vector. Holds the memory mapping alive; cells are
/// accessed through atomics laid directly over the mapped bytes.
pub struct ControlVector {
    _mmap: MmapMut,
    cells: *const [AtomicI64; CONTROL_VECTOR_LEN],
}

// The mapping is backed by a file shared across processes; every access
// goes through atomics, so concurrent cross-process use is sound.
unsafe impl Send for ControlVector {}
unsafe impl Sync for ControlVector {}

impl ControlVector {
    fn from_mmap(mmap: MmapMut) -> ShmResult<Self> {
        if mmap.len() < SEGMENT_BYTES {
            return Err(ShmError::InvalidSize { size: mmap.len() });
        }
        let cells = mmap.as_ptr() as *const [AtomicI64; CONTROL_VECTOR_LEN];
        Ok(Self { _mmap: mmap, cells })
    }

    /// Creates the backing segment at `path`, zero-initialized. The
    /// engine calls this once at startup before spawning the UI process.
    pub fn create(path: &str) -> ShmResult<Self> {
        let mmap = create_segment_mmap(path, SEGMENT_BYTES)?;
        Self::from_mmap(mmap)
    }

    /// Attaches to an existing segment. The UI process calls this after
    /// the engine has created it.
    pub fn attach(path: &str) -> ShmResult<Self> {
        let mmap = attach_segment_mmap(path)?;
        Self::from_mmap(mmap)
    }

    fn cell(&self, index: usize) -> ShmResult<&AtomicI64> {
        if index >= CONTROL_VECTOR_LEN {
            return Err(ShmError::IndexOutOfBounds {
                index,
                len: CONTROL_VECTOR_LEN,
            });
        }
        Ok(unsafe { &(*self.cells)[index] })
    }

    pub fn get(&self, index: usize) -> ShmResult<i64> {
        Ok(self.cell(index)?.load(Ordering::Acquire))
    }

    pub fn set(&self, index: usize, value: i64) -> ShmResult<()> {
        self.cell(index)?.store(value, Ordering::Release);
        Ok(())
    }

    /// Reads a one-shot signal cell and clears it atomically, returning
    /// whether it had been set (§4.6: `exit_signal`/`reward_signal` etc
    /// are "auto-cleared after read").
    pub fn take_one_shot(&self, index: usize) -> ShmResult<bool> {
        let previous = self.cell(index)?.swap(0, Ordering::AcqRel);
        Ok(previous != 0)
    }
}
