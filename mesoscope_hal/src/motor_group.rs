//! Motor Group (§4.4): a daisy-chained connection to three Zaber
//! controller groups (headbar, lickport, wheel).

use crate::error::{HalError, HalResult};
use mesoscope_common::positions::ZaberPositions;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// One axis's hardcoded controller-resident targets and motion limits
/// (§4.4: "caches three hardcoded targets ... and the axis's motion
/// limits").
#[derive(Debug, Clone, Copy)]
pub struct AxisTargets {
    pub park: i32,
    pub maintenance: i32,
    pub mount: i32,
    pub min_limit: i32,
    pub max_limit: i32,
}

/// A single daisy-chained Zaber axis. The default implementation
/// simulates motion instantaneously; a hardware backend would replace
/// `move_to`/`home` with real serial round-trips while keeping the
/// same busy/position contract.
pub trait Axis: Send + Sync {
    fn name(&self) -> &str;
    fn is_connected(&self) -> bool;
    fn is_busy(&self) -> bool;
    fn position(&self) -> i32;
    fn targets(&self) -> AxisTargets;
    fn move_to(&self, target: i32) -> HalResult<()>;
    fn home(&self) -> HalResult<()>;
}

/// Simulated axis backend (grounded on the teacher's `drivers::simulation`
/// pattern): motion completes synchronously, so `is_busy()` is only
/// ever observed `true` by a caller racing the same thread.
pub struct SimulatedAxis {
    name: String,
    connected: AtomicBool,
    busy: AtomicBool,
    position: AtomicI32,
    targets: AxisTargets,
}

impl SimulatedAxis {
    pub fn new(name: impl Into<String>, targets: AxisTargets) -> Self {
        Self {
            name: name.into(),
            connected: AtomicBool::new(true),
            busy: AtomicBool::new(false),
            position: AtomicI32::new(targets.park),
            targets,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

impl Axis for SimulatedAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn position(&self) -> i32 {
        self.position.load(Ordering::Acquire)
    }

    fn targets(&self) -> AxisTargets {
        self.targets
    }

    fn move_to(&self, target: i32) -> HalResult<()> {
        if !self.is_connected() {
            return Err(HalError::AxisNotConnected { axis: self.name.clone() });
        }
        if self.is_busy() {
            return Err(HalError::AxisBusy { axis: self.name.clone() });
        }
        let clamped = target.clamp(self.targets.min_limit, self.targets.max_limit);
        self.busy.store(true, Ordering::Release);
        self.position.store(clamped, Ordering::Release);
        self.busy.store(false, Ordering::Release);
        Ok(())
    }

    fn home(&self) -> HalResult<()> {
        self.move_to(0)
    }
}

/// Owns the three Zaber groups' axes and the safety lock gating motion
/// (§4.4).
pub struct MotorGroup {
    headbar_z: Box<dyn Axis>,
    headbar_pitch: Box<dyn Axis>,
    headbar_roll: Box<dyn Axis>,
    wheel_x: Box<dyn Axis>,
    lickport_z: Box<dyn Axis>,
    lickport_x: Box<dyn Axis>,
    lickport_y: Box<dyn Axis>,
    parked_lock: AtomicBool,
    cached_positions: Option<ZaberPositions>,
}

impl MotorGroup {
    pub fn new(
        headbar_z: Box<dyn Axis>,
        headbar_pitch: Box<dyn Axis>,
        headbar_roll: Box<dyn Axis>,
        wheel_x: Box<dyn Axis>,
        lickport_z: Box<dyn Axis>,
        lickport_x: Box<dyn Axis>,
        lickport_y: Box<dyn Axis>,
        cached_positions: Option<ZaberPositions>,
    ) -> Self {
        Self {
            headbar_z,
            headbar_pitch,
            headbar_roll,
            wheel_x,
            lickport_z,
            lickport_x,
            lickport_y,
            parked_lock: AtomicBool::new(true),
            cached_positions,
        }
    }

    fn axes(&self) -> [&dyn Axis; 7] {
        [
            self.headbar_z.as_ref(),
            self.headbar_pitch.as_ref(),
            self.headbar_roll.as_ref(),
            self.wheel_x.as_ref(),
            self.lickport_z.as_ref(),
            self.lickport_x.as_ref(),
            self.lickport_y.as_ref(),
        ]
    }

    fn lickport_axes(&self) -> [&dyn Axis; 3] {
        [self.lickport_z.as_ref(), self.lickport_x.as_ref(), self.lickport_y.as_ref()]
    }

    /// `is_connected` (§4.4): all-three-connected, i.e. every axis
    /// across all three serial groups reports connected.
    pub fn is_connected(&self) -> bool {
        self.axes().iter().all(|axis| axis.is_connected())
    }

    pub fn unpark_motors(&self) {
        self.parked_lock.store(false, Ordering::Release);
    }

    pub fn park_motors(&self) {
        self.parked_lock.store(true, Ordering::Release);
    }

    /// `wait_until_idle()` (§4.4): busy-waits until no axis reports
    /// busy.
    pub fn wait_until_idle(&self) {
        while self.axes().iter().any(|axis| axis.is_busy()) {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }

    fn move_all(&self, select: impl Fn(AxisTargets) -> i32) -> HalResult<()> {
        self.unpark_motors();
        for axis in self.axes() {
            if !axis.is_connected() {
                continue;
            }
            axis.move_to(select(axis.targets()))?;
        }
        self.wait_until_idle();
        self.park_motors();
        Ok(())
    }

    /// `prepare_motors()` (§4.4): unpark all, home each axis, park all.
    /// Required before any motion command is accepted.
    pub fn prepare_motors(&self) -> HalResult<()> {
        self.unpark_motors();
        for axis in self.axes() {
            if axis.is_connected() {
                axis.home()?;
            }
        }
        self.wait_until_idle();
        self.park_motors();
        Ok(())
    }

    /// `park_position()` (§4.4): move all axes to park.
    pub fn park_position(&self) -> HalResult<()> {
        self.move_all(|t| t.park)
    }

    /// `maintenance_position()` (§4.4): move all axes to maintenance.
    pub fn maintenance_position(&self) -> HalResult<()> {
        self.move_all(|t| t.maintenance)
    }

    /// `mount_position()` (§4.4): move lickport (and, if no cache,
    /// everything else) to mount.
    pub fn mount_position(&self) -> HalResult<()> {
        self.unpark_motors();
        for axis in self.lickport_axes() {
            if axis.is_connected() {
                axis.move_to(axis.targets().mount)?;
            }
        }
        if self.cached_positions.is_none() {
            for axis in self.axes() {
                if axis.is_connected() {
                    axis.move_to(axis.targets().mount)?;
                }
            }
        }
        self.wait_until_idle();
        self.park_motors();
        Ok(())
    }

    /// `unmount_position()` (§4.4): same motion as mount, issued on the
    /// reverse transition.
    pub fn unmount_position(&self) -> HalResult<()> {
        self.mount_position()
    }

    /// `restore_position()` (§4.4): move to last-cached runtime
    /// positions, or to mount/park defaults if none exist.
    pub fn restore_position(&self) -> HalResult<()> {
        match self.cached_positions {
            Some(cached) => {
                self.unpark_motors();
                self.headbar_z.move_to(cached.headbar_z)?;
                self.headbar_pitch.move_to(cached.headbar_pitch)?;
                self.headbar_roll.move_to(cached.headbar_roll)?;
                self.wheel_x.move_to(cached.wheel_x)?;
                self.lickport_z.move_to(cached.lickport_z)?;
                self.lickport_x.move_to(cached.lickport_x)?;
                self.lickport_y.move_to(cached.lickport_y)?;
                self.wait_until_idle();
                self.park_motors();
                Ok(())
            }
            None => self.mount_position(),
        }
    }

    /// `generate_position_snapshot()` (§4.4): polls current positions.
    pub fn generate_position_snapshot(&self) -> ZaberPositions {
        ZaberPositions {
            headbar_z: self.headbar_z.position(),
            headbar_pitch: self.headbar_pitch.position(),
            headbar_roll: self.headbar_roll.position(),
            wheel_x: self.wheel_x.position(),
            lickport_z: self.lickport_z.position(),
            lickport_x: self.lickport_x.position(),
            lickport_y: self.lickport_y.position(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(park: i32, maintenance: i32, mount: i32) -> AxisTargets {
        AxisTargets { park, maintenance, mount, min_limit: -100_000, max_limit: 100_000 }
    }

    fn group() -> MotorGroup {
        MotorGroup::new(
            Box::new(SimulatedAxis::new("headbar_z", targets(0, 5000, 2000))),
            Box::new(SimulatedAxis::new("headbar_pitch", targets(0, 100, 50))),
            Box::new(SimulatedAxis::new("headbar_roll", targets(0, 100, 50))),
            Box::new(SimulatedAxis::new("wheel_x", targets(0, 300, 150))),
            Box::new(SimulatedAxis::new("lickport_z", targets(0, 400, 200))),
            Box::new(SimulatedAxis::new("lickport_x", targets(0, 400, 200))),
            Box::new(SimulatedAxis::new("lickport_y", targets(0, 400, 200))),
            None,
        )
    }

    #[test]
    fn prepare_motors_homes_and_ends_parked() {
        let g = group();
        g.prepare_motors().unwrap();
        assert_eq!(g.generate_position_snapshot().headbar_z, 0);
        assert!(g.park_position().is_ok(), "group ends parked, so further motion must re-unpark internally");
    }

    #[test]
    fn mount_position_moves_every_axis_when_uncached() {
        let g = group();
        g.mount_position().unwrap();
        let snap = g.generate_position_snapshot();
        assert_eq!(snap.lickport_z, 200);
        assert_eq!(snap.wheel_x, 150);
    }

    #[test]
    fn disconnected_axis_is_skipped_not_failed() {
        let headbar_z = SimulatedAxis::new("headbar_z", targets(0, 5000, 2000));
        headbar_z.set_connected(false);
        let g = MotorGroup::new(
            Box::new(headbar_z),
            Box::new(SimulatedAxis::new("headbar_pitch", targets(0, 100, 50))),
            Box::new(SimulatedAxis::new("headbar_roll", targets(0, 100, 50))),
            Box::new(SimulatedAxis::new("wheel_x", targets(0, 300, 150))),
            Box::new(SimulatedAxis::new("lickport_z", targets(0, 400, 200))),
            Box::new(SimulatedAxis::new("lickport_x", targets(0, 400, 200))),
            Box::new(SimulatedAxis::new("lickport_y", targets(0, 400, 200))),
            None,
        );
        assert!(!g.is_connected());
        assert!(g.park_position().is_ok());
    }

    #[test]
    fn restore_position_uses_cache_when_present() {
        let cached = ZaberPositions {
            headbar_z: 123,
            headbar_pitch: 5,
            headbar_roll: -5,
            wheel_x: 10,
            lickport_z: 20,
            lickport_x: 21,
            lickport_y: 22,
        };
        let mut g = group();
        g.cached_positions = Some(cached);
        g.restore_position().unwrap();
        assert_eq!(g.generate_position_snapshot(), cached);
    }
}
