//! Busy-loop workload

use std::hint;
use std::time::{Duration, Instant};

use crate::calibrate::Workload;

/// Inner spin steps per outer iteration
pub const INNER_STEPS: u32 = 1000;

/// Busy loop of `factor * ms` outer iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummyLoad {
    factor: u64,
}

impl Default for DummyLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyLoad {
    /// Uncalibrated load (factor 1)
    pub const fn new() -> Self {
        Self { factor: 1 }
    }

    /// Spin for roughly `ms` milliseconds at the current factor
    pub fn run(&self, ms: u32) {
        let outer = self.factor.saturating_mul(u64::from(ms));
        for j in 0..outer {
            for _ in 0..INNER_STEPS {
                hint::spin_loop();
            }
            hint::black_box(j);
        }
    }
}

impl Workload for DummyLoad {
    fn factor(&self) -> u64 {
        self.factor
    }

    fn set_factor(&mut self, factor: u64) {
        self.factor = factor;
    }

    fn measure(&mut self, ms: u32) -> Duration {
        let start = Instant::now();
        self.run(ms);
        start.elapsed()
    }
}
