//! Metric line output.
//!
//! Every metric of a pass is written to the success stream as
//! `<namespace>.<metric> <timestamp> <value>[ <tags>]`, sharing the
//! timestamp captured when the pass started. Diagnostics go to a separate
//! error stream so consumers tailing the success stream never see them.

use std::fmt::Display;
use std::io::{self, Write};

/// Formats a single metric line (without the trailing newline).
pub fn format_metric(
    namespace: &str,
    metric: &str,
    timestamp: i64,
    value: u64,
    tags: Option<&str>,
) -> String {
    match tags {
        Some(tags) if !tags.is_empty() => {
            format!("{namespace}.{metric} {timestamp} {value} {tags}")
        }
        _ => format!("{namespace}.{metric} {timestamp} {value}"),
    }
}

/// Writes metric lines and diagnostics for one pass.
pub struct Emitter<O: Write, E: Write> {
    out: O,
    err: E,
    timestamp: i64,
    emitted: usize,
    diagnostics: usize,
}

impl<O: Write, E: Write> Emitter<O, E> {
    pub fn new(out: O, err: E, timestamp: i64) -> Self {
        Self {
            out,
            err,
            timestamp,
            emitted: 0,
            diagnostics: 0,
        }
    }

    /// Writes one metric line. Absent values are skipped silently: that is
    /// how fields unsupported by the running kernel are handled.
    pub fn emit(
        &mut self,
        namespace: &str,
        metric: &str,
        value: Option<u64>,
        tags: Option<&str>,
    ) -> io::Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        let line = format_metric(namespace, metric, self.timestamp, value, tags);
        writeln!(self.out, "{line}")?;
        self.emitted += 1;
        Ok(())
    }

    /// Writes one human-readable diagnostic line to the error stream.
    pub fn error(&mut self, message: impl Display) -> io::Result<()> {
        writeln!(self.err, "{message}")?;
        self.diagnostics += 1;
        Ok(())
    }

    /// Flushes the success stream. Called once at the end of a pass.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.err.flush()
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn diagnostics(&self) -> usize {
        self.diagnostics
    }
}
