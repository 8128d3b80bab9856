//! `dummy-task <requested_ms>`: calibrate, busy-loop, report.

use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;

use cadence_dummy_task::{Calibrator, DummyLoad, Workload, DEFAULT_LOG_FILTER};

#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Busy-loop for a requested number of milliseconds")]
struct Arguments {
    /// Requested execution time in milliseconds
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    requested_ms: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER),
    )
    .init();

    let arguments = Arguments::parse();

    let mut load = DummyLoad::new();
    let calibration = Calibrator::default().run(&mut load);
    if calibration.converged {
        log::info!(
            "calibrated factor {} ({:?} for the 10 ms reference)",
            calibration.factor,
            calibration.measured
        );
    } else {
        log::warn!(
            "calibration did not converge after {} steps, using factor {}",
            calibration.iterations,
            calibration.factor
        );
    }

    let actual = load.measure(arguments.requested_ms);

    let mut out = io::stdout().lock();
    writeln!(out, "Requested execution time: {} ms", arguments.requested_ms)
        .and_then(|()| {
            writeln!(
                out,
                "Actual execution time   : {:.3} ms",
                actual.as_secs_f64() * 1000.0
            )
        })
        .context("failed to write report")?;

    Ok(())
}
