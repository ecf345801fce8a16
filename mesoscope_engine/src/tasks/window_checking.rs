//! Window checking controller (§4.9 "Window checking").
//!
//! The shortened variant: motor setup, mesoscope prep, and the
//! descriptor/position snapshots all already happen inside
//! [`crate::startup::startup`], and the post-session snapshots and
//! preprocessing prompt inside [`crate::shutdown::shutdown`]. This
//! controller exists only so the dispatcher can drive all four session
//! types through the same startup → task → shutdown shape; it never
//! calls [`crate::cycle::runtime_cycle`].

use crate::cycle::RuntimeContext;
use crate::error::EngineResult;

pub fn run(_ctx: &mut RuntimeContext<'_>) -> EngineResult<()> {
    Ok(())
}
