//! # Dummy Task
//!
//! A CPU-bound workload that runs for a requested number of milliseconds.
//! Used to exercise reservations from user space: run it under a budget and
//! compare the requested time with what it actually took.
//!
//! The busy loop has no notion of time. Its length is a calibration factor
//! times the requested milliseconds, and the factor is tuned once at start
//! against a 10 ms reference.

pub mod calibrate;
pub mod load;

pub use calibrate::{Calibration, Calibrator, Workload};
pub use load::DummyLoad;

/// `env_logger` filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info";
