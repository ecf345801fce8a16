//! ValveInterface (type 5, §4.2): power-law volume calibration,
//! `volume_uL = A * duration_us^B`.

use crate::error::{HalError, HalResult};
use crate::module_interface::{Command, ModuleInterface};
use mesoscope_common::consts::{event, module_type, VALVE_MIN_DURATION_US};
use mesoscope_shm::ValveTracker;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const EXPECTED_EVENTS: [u8; 3] =
    [event::VALVE_OPEN, event::VALVE_CLOSED, event::VALVE_CALIBRATION_DONE];

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

/// Fits `volume = A * duration^B` to calibration points by Gauss-Newton
/// nonlinear least squares, seeded from the log-log linear solution.
///
/// Returns `(A, B, covariance)` with `A`/`B` rounded to 8 decimals
/// (§4.2, confirmed by the original source's rounding step).
pub fn fit_power_law(points: &[(f64, f64)]) -> (f64, f64, [[f64; 2]; 2]) {
    assert!(points.len() >= 2, "power-law fit needs at least two calibration points");

    // Seed via log-log ordinary least squares: ln(v) = ln(A) + B*ln(d).
    let n = points.len() as f64;
    let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
    for &(d, v) in points {
        let (lx, ly) = (d.ln(), v.ln());
        sx += lx;
        sy += ly;
        sxx += lx * lx;
        sxy += lx * ly;
    }
    let b_seed = (n * sxy - sx * sy) / (n * sxx - sx * sx);
    let ln_a_seed = (sy - b_seed * sx) / n;
    let mut a = ln_a_seed.exp();
    let mut b = b_seed;

    // A handful of Gauss-Newton refinement steps on the true nonlinear
    // residual r_i = A*d_i^B - v_i.
    for _ in 0..25 {
        let (mut jtj00, mut jtj01, mut jtj11) = (0.0, 0.0, 0.0);
        let (mut jtr0, mut jtr1) = (0.0, 0.0);
        for &(d, v) in points {
            let dp_b = d.powf(b);
            let residual = a * dp_b - v;
            let dr_da = dp_b;
            let dr_db = a * dp_b * d.ln();
            jtj00 += dr_da * dr_da;
            jtj01 += dr_da * dr_db;
            jtj11 += dr_db * dr_db;
            jtr0 += dr_da * residual;
            jtr1 += dr_db * residual;
        }
        let det = jtj00 * jtj11 - jtj01 * jtj01;
        if det.abs() < 1e-18 {
            break;
        }
        let delta_a = (jtj11 * jtr0 - jtj01 * jtr1) / det;
        let delta_b = (jtj00 * jtr1 - jtj01 * jtr0) / det;
        a -= delta_a;
        b -= delta_b;
        if delta_a.abs() < 1e-12 && delta_b.abs() < 1e-12 {
            break;
        }
    }

    // Covariance estimate sigma^2 * (J^T J)^-1, with sigma^2 the
    // residual variance at the converged solution.
    let mut sse = 0.0;
    let (mut jtj00, mut jtj01, mut jtj11) = (0.0, 0.0, 0.0);
    for &(d, v) in points {
        let dp_b = d.powf(b);
        let residual = a * dp_b - v;
        sse += residual * residual;
        let dr_da = dp_b;
        let dr_db = a * dp_b * d.ln();
        jtj00 += dr_da * dr_da;
        jtj01 += dr_da * dr_db;
        jtj11 += dr_db * dr_db;
    }
    let dof = (points.len() as f64 - 2.0).max(1.0);
    let sigma2 = sse / dof;
    let det = (jtj00 * jtj11 - jtj01 * jtj01).max(1e-18);
    let covariance = [
        [sigma2 * jtj11 / det, -sigma2 * jtj01 / det],
        [-sigma2 * jtj01 / det, sigma2 * jtj00 / det],
    ];

    (round8(a), round8(b), covariance)
}

pub struct ValveInterface {
    module_id: u8,
    pub a: f64,
    pub b: f64,
    pub covariance: [[f64; 2]; 2],
    tracker: Arc<ValveTracker>,
    open_t_us: AtomicU64,
}

impl ValveInterface {
    pub fn new(module_id: u8, calibration_points: &[(f64, f64)]) -> Self {
        let (a, b, covariance) = fit_power_law(calibration_points);
        Self {
            module_id,
            a,
            b,
            covariance,
            tracker: ValveTracker::handle(),
            open_t_us: AtomicU64::new(0),
        }
    }

    pub fn tracker(&self) -> Arc<ValveTracker> {
        Arc::clone(&self.tracker)
    }

    /// Smallest reliably dispensable volume, evaluated at the 10us
    /// floor duration (§4.2).
    pub fn min_dispensable_volume_ul(&self) -> f64 {
        self.a * VALVE_MIN_DURATION_US.powf(self.b)
    }

    /// Inverts the power law to a pulse duration in microseconds.
    /// Raises `VolumeBelowFloor` if the request is below what the
    /// floor duration can reliably dispense (§4.2).
    pub fn get_duration_from_volume(&self, volume_ul: f64) -> HalResult<f64> {
        if volume_ul < self.min_dispensable_volume_ul() {
            return Err(HalError::VolumeBelowFloor { volume_ul });
        }
        Ok((volume_ul / self.a).powf(1.0 / self.b))
    }

    /// `deliver_reward(volume_uL)` (§4.2): inverts the power law and
    /// issues a blocking one-off pulse.
    pub fn deliver_reward(&self, volume_ul: f64) -> HalResult<Command> {
        let duration_us = self.get_duration_from_volume(volume_ul)?;
        Ok(Command::OneOff {
            code: 1,
            payload: duration_us.to_le_bytes().to_vec(),
            noblock: false,
        })
    }

    /// `set_state(bool)` (§4.2): latches open/closed.
    pub fn set_state(&self, open: bool) -> Command {
        Command::OneOff {
            code: if open { 2 } else { 3 },
            payload: Vec::new(),
            noblock: true,
        }
    }

    /// `reference_valve()` (§4.2): 200 pulses at 5 uL each.
    pub fn reference_valve(&self) -> HalResult<Vec<Command>> {
        use mesoscope_common::consts::{VALVE_REFERENCE_PULSE_COUNT, VALVE_REFERENCE_VOLUME_UL};
        let pulse = self.deliver_reward(VALVE_REFERENCE_VOLUME_UL)?;
        Ok(std::iter::repeat(pulse).take(VALVE_REFERENCE_PULSE_COUNT as usize).collect())
    }

    /// `calibrate_valve(pulse_us)` (§4.2): a single pulse train of the
    /// given duration; the microcontroller reports event 54 on completion.
    pub fn calibrate_valve(&self, pulse_us: f64) -> Command {
        Command::OneOff {
            code: 1,
            payload: pulse_us.to_le_bytes().to_vec(),
            noblock: false,
        }
    }
}

impl ModuleInterface for ValveInterface {
    fn module_type(&self) -> u8 {
        module_type::VALVE
    }

    fn module_id(&self) -> u8 {
        self.module_id
    }

    fn expected_events(&self) -> &'static [u8] {
        &EXPECTED_EVENTS
    }

    fn initial_parameters(&self) -> Command {
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&self.a.to_le_bytes());
        payload.extend_from_slice(&self.b.to_le_bytes());
        Command::SetParameters(payload)
    }

    fn handle_event(&self, event_code: u8, _payload: &[u8], t_us: u64) {
        match event_code {
            code if code == event::VALVE_OPEN => {
                self.open_t_us.store(t_us, Ordering::Release);
            }
            code if code == event::VALVE_CLOSED => {
                let opened_at = self.open_t_us.load(Ordering::Acquire);
                let elapsed_us = t_us.saturating_sub(opened_at) as f64;
                self.tracker.add_volume(self.a * elapsed_us.powf(self.b));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exact_power_law_points() {
        let (a_true, b_true) = (0.0025, 1.05);
        let points: Vec<(f64, f64)> = (1..=6)
            .map(|i| {
                let d = (i as f64) * 5000.0;
                (d, a_true * d.powf(b_true))
            })
            .collect();
        let (a, b, _) = fit_power_law(&points);
        assert!((a - a_true).abs() / a_true < 1e-3, "A={a} expected {a_true}");
        assert!((b - b_true).abs() / b_true < 1e-3, "B={b} expected {b_true}");
    }

    #[test]
    fn open_close_cycle_accumulates_volume() {
        let points = vec![(5000.0, 2.0), (10000.0, 4.5), (20000.0, 9.8), (40000.0, 20.1)];
        let iface = ValveInterface::new(1, &points);
        iface.handle_event(event::VALVE_OPEN, &[], 1_000_000);
        iface.handle_event(event::VALVE_CLOSED, &[], 1_010_000);
        assert!(iface.tracker().load() > 0.0);
    }

    #[test]
    fn volume_below_floor_is_rejected() {
        let points = vec![(5000.0, 2.0), (10000.0, 4.5), (20000.0, 9.8), (40000.0, 20.1)];
        let iface = ValveInterface::new(1, &points);
        let floor = iface.min_dispensable_volume_ul();
        assert!(matches!(
            iface.get_duration_from_volume(floor / 10.0),
            Err(HalError::VolumeBelowFloor { .. })
        ));
    }
}
