//! # Load Calibration
//!
//! Tunes a workload's factor so that running it for the reference duration
//! takes that long, within tolerance.
//!
//! 1. Bootstrap: starting from factor 1, multiply by ten until a run is long
//!    enough to scale from (0.1 ms), or the factor passes one million.
//! 2. Proportional steps: `next = round(factor * target / measured)`, at
//!    least 1 and at most ten times the current factor. A run too short to
//!    register at all doubles the factor instead (minimum 10).
//!
//! After the step limit the last factor is kept, converged or not.

use std::time::Duration;

/// Something whose run length scales with a factor
pub trait Workload {
    /// Current factor
    fn factor(&self) -> u64;

    /// Replace the factor
    fn set_factor(&mut self, factor: u64);

    /// Run for `ms` nominal milliseconds and report how long it took
    fn measure(&mut self, ms: u32) -> Duration;
}

/// Factor past which the bootstrap stops growing
const BOOTSTRAP_LIMIT: u64 = 1_000_000;

/// Shortest run the proportional step trusts
const MIN_MEASURABLE: Duration = Duration::from_micros(100);

/// Largest growth per proportional step
const MAX_STEP: u64 = 10;

/// Calibration outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Final factor
    pub factor: u64,
    /// Last measured reference run
    pub measured: Duration,
    /// Proportional steps taken
    pub iterations: usize,
    /// Did the last run land within tolerance?
    pub converged: bool,
}

/// Calibration parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibrator {
    reference_ms: u32,
    tolerance: Duration,
    max_iterations: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(10, Duration::from_micros(500), 20)
    }
}

impl Calibrator {
    /// Calibrate against `reference_ms` within `tolerance`, in at most
    /// `max_iterations` proportional steps
    pub const fn new(reference_ms: u32, tolerance: Duration, max_iterations: usize) -> Self {
        Self {
            reference_ms,
            tolerance,
            max_iterations,
        }
    }

    fn target(&self) -> Duration {
        Duration::from_millis(u64::from(self.reference_ms))
    }

    /// Tune `workload` in place
    pub fn run<W: Workload>(&self, workload: &mut W) -> Calibration {
        let target = self.target();

        workload.set_factor(1);
        let mut measured = workload.measure(self.reference_ms);

        while measured < MIN_MEASURABLE {
            let factor = workload.factor();
            if factor > BOOTSTRAP_LIMIT {
                break;
            }
            workload.set_factor(factor.saturating_mul(10));
            measured = workload.measure(self.reference_ms);
        }
        log::debug!(
            "calibrate: bootstrap factor {} -> {:?}",
            workload.factor(),
            measured
        );

        let mut iterations = 0;
        while iterations < self.max_iterations {
            if measured.abs_diff(target) <= self.tolerance {
                return self.finish(workload, measured, iterations, true);
            }

            let next = next_factor(workload.factor(), target, measured);
            workload.set_factor(next);
            measured = workload.measure(self.reference_ms);
            iterations += 1;

            log::trace!("calibrate: step {} factor {} -> {:?}", iterations, next, measured);
        }

        let converged = measured.abs_diff(target) <= self.tolerance;
        self.finish(workload, measured, iterations, converged)
    }

    fn finish<W: Workload>(
        &self,
        workload: &W,
        measured: Duration,
        iterations: usize,
        converged: bool,
    ) -> Calibration {
        let calibration = Calibration {
            factor: workload.factor(),
            measured,
            iterations,
            converged,
        };
        log::debug!("calibrate: {:?}", calibration);
        calibration
    }
}

/// One proportional step
fn next_factor(factor: u64, target: Duration, measured: Duration) -> u64 {
    if measured.is_zero() {
        return if factor < 10 { 10 } else { factor.saturating_mul(2) };
    }

    let scale = target.as_secs_f64() / measured.as_secs_f64();
    let next = (factor as f64 * scale).round() as u64;
    next.clamp(1, factor.saturating_mul(MAX_STEP).max(1))
}
