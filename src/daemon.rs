//! The collection loop.
//!
//! A [`Collector`] moves through three states:
//!
//! - `Startup`: privileges dropped, stdin closed, sources opened. Failing to
//!   open a source terminates with [`EXIT_DO_NOT_RESTART`].
//! - `Running`: one pass per interval. Parent liveness is checked before each
//!   pass and before every slice of the sleep between passes.
//! - `Terminated`: the parent went away, or startup failed.
//!
//! Termination signals keep their default disposition and end the process
//! during a sleep.

use std::io::{self, Read, Seek, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use nix::unistd::{getppid, Pid};
use tracing::{debug, error, info, warn};

use crate::pass::{run_pass, PassReport};
use crate::startup::{close_stdin, drop_privileges, Sources};

/// Exit code telling the supervisor not to restart the collector.
pub const EXIT_DO_NOT_RESTART: i32 = 13;

/// Exit code used when the parent process is gone.
pub const EXIT_PARENT_GONE: i32 = 1;

/// Default interval between passes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Longest uninterrupted sleep between two liveness checks.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A source could not be opened; restarting will not help.
    SourcesUnavailable,
    /// The process that spawned the collector has exited.
    ParentGone,
}

impl Termination {
    pub fn exit_code(self) -> i32 {
        match self {
            Termination::SourcesUnavailable => EXIT_DO_NOT_RESTART,
            Termination::ParentGone => EXIT_PARENT_GONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Startup,
    Running,
    Terminated(Termination),
}

/// Tells the loop whether the supervising parent is still around.
pub trait ParentWatch {
    fn parent_alive(&mut self) -> bool;
}

/// Detects parent death by reparenting: once the parent exits the kernel
/// hands the process to init (or the nearest subreaper) and the parent pid
/// changes.
///
/// Only a change after [`ReparentWatch::new`] is seen. A supervisor that dies
/// before the watch is built leaves the process already reparented, and the
/// watch then treats init as the parent. [`ReparentWatch::started_under_init`]
/// reports that case so the caller can at least log it.
#[derive(Debug, Clone, Copy)]
pub struct ReparentWatch {
    parent: Pid,
}

impl ReparentWatch {
    pub fn new() -> Self {
        Self { parent: getppid() }
    }

    /// True when the recorded parent is init, either because init started
    /// the collector or because the real parent was already gone.
    pub fn started_under_init(&self) -> bool {
        self.parent == Pid::from_raw(1)
    }
}

impl Default for ReparentWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ParentWatch for ReparentWatch {
    fn parent_alive(&mut self) -> bool {
        getppid() == self.parent
    }
}

/// Runs passes over two kept-open sources until the parent goes away.
pub struct Collector<S, N, W> {
    sources: Sources<S, N>,
    watch: W,
    interval: Duration,
    page_size: u64,
    state: State,
    passes: u64,
}

impl<W: ParentWatch> Collector<std::fs::File, std::fs::File, W> {
    /// Performs the startup sequence: drop privileges to `user`, close stdin,
    /// open both sources once.
    pub fn start(
        sockstat_path: &Path,
        netstat_path: &Path,
        user: &str,
        watch: W,
        interval: Duration,
        page_size: u64,
    ) -> Result<Self, Termination> {
        drop_privileges(user);
        close_stdin();
        Self::open(sockstat_path, netstat_path, watch, interval, page_size)
    }

    /// Opens both sources. A source that cannot be opened maps to
    /// [`Termination::SourcesUnavailable`].
    pub fn open(
        sockstat_path: &Path,
        netstat_path: &Path,
        watch: W,
        interval: Duration,
        page_size: u64,
    ) -> Result<Self, Termination> {
        match Sources::open(sockstat_path, netstat_path) {
            Ok(sources) => Ok(Self::new(sources, watch, interval, page_size)),
            Err(e) => {
                error!("{} - asking the supervisor not to restart us", e);
                Err(Termination::SourcesUnavailable)
            }
        }
    }
}

impl<S, N, W> Collector<S, N, W>
where
    S: Read + Seek,
    N: Read + Seek,
    W: ParentWatch,
{
    /// Builds a collector over already opened sources.
    pub fn new(sources: Sources<S, N>, watch: W, interval: Duration, page_size: u64) -> Self {
        Self {
            sources,
            watch,
            interval,
            page_size,
            state: State::Startup,
            passes: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Number of completed passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Runs a single pass stamped with the current time.
    pub fn run_once<O: Write, E: Write>(&mut self, out: O, err: E) -> io::Result<PassReport> {
        let timestamp = chrono::Utc::now().timestamp();
        let report = run_pass(
            &mut self.sources.sockstat,
            &mut self.sources.netstat,
            out,
            err,
            timestamp,
            self.page_size,
        )?;
        self.passes += 1;
        Ok(report)
    }

    /// Runs passes until the parent goes away. Only write failures on the
    /// output streams are returned as errors.
    pub fn run<O: Write, E: Write>(&mut self, out: &mut O, err: &mut E) -> io::Result<Termination> {
        self.state = State::Running;
        info!(
            "Collecting every {:.1}s (page size {} bytes)",
            self.interval.as_secs_f64(),
            self.page_size
        );

        loop {
            if !self.watch.parent_alive() {
                return Ok(self.terminate(Termination::ParentGone));
            }

            let report = self.run_once(&mut *out, &mut *err)?;
            debug!(
                "Pass {} at {}: {} metrics, {} diagnostics (sockstat ok: {}, netstat ok: {})",
                self.passes,
                report.timestamp,
                report.emitted,
                report.diagnostics,
                report.sockstat_ok,
                report.netstat_ok
            );

            if !self.sleep_interval() {
                return Ok(self.terminate(Termination::ParentGone));
            }
        }
    }

    /// Sleeps for the interval in slices, checking liveness before each one.
    /// Returns false as soon as the parent is gone.
    fn sleep_interval(&mut self) -> bool {
        let mut remaining = self.interval;
        while !remaining.is_zero() {
            if !self.watch.parent_alive() {
                return false;
            }
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        true
    }

    fn terminate(&mut self, reason: Termination) -> Termination {
        warn!("Parent process is gone after {} passes, exiting", self.passes);
        self.state = State::Terminated(reason);
        reason
    }
}
