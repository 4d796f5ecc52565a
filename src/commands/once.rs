//! Once command implementation.
//!
//! Runs a single collection pass and exits.

use std::io::{self, BufWriter};

use netstat_collector::daemon::{Collector, ReparentWatch};
use tracing::info;

use crate::config::Config;

/// Runs one pass against the configured sources. Returns the process exit code.
pub fn command_once(config: &Config) -> anyhow::Result<i32> {
    let mut collector = match Collector::start(
        config.sockstat_path(),
        config.netstat_path(),
        config.user(),
        ReparentWatch::new(),
        config.interval(),
        config.page_size(),
    ) {
        Ok(c) => c,
        Err(termination) => return Ok(termination.exit_code()),
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let report = collector.run_once(&mut out, io::stderr().lock())?;

    info!(
        "Single pass emitted {} metrics with {} diagnostics",
        report.emitted, report.diagnostics
    );
    Ok(0)
}
