//! netstat-collector library
//!
//! Reads /proc/net/sockstat and /proc/net/netstat, maps the kernel counters
//! to normalized metric names and writes them as a line-oriented stream for a
//! tcollector-style supervisor:
//!
//! ```text
//! net.sockstat.sockets_inuse 1700000000 5 type=tcp
//! net.stat.tcp.failed_accept 1700000000 7 reason=other
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::io::Cursor;
//! use netstat_collector::pass::run_pass;
//!
//! let mut sockstat = Cursor::new(
//!     "sockets: used 42\n\
//!      TCP: inuse 5 orphan 1 tw 2 alloc 5 mem 10\n\
//!      UDP: inuse 3\n\
//!      RAW: inuse 0\n\
//!      FRAG: inuse 0 memory 0\n",
//! );
//! let mut netstat = Cursor::new("TcpExt: ListenOverflows ListenDrops\nTcpExt: 3 10\n");
//! let mut out = Vec::new();
//! let mut err = Vec::new();
//!
//! let report = run_pass(&mut sockstat, &mut netstat, &mut out, &mut err, 1700000000, 4096).unwrap();
//! assert!(report.sockstat_ok && report.netstat_ok);
//!
//! let out = String::from_utf8(out).unwrap();
//! assert!(out.contains("net.stat.tcp.failed_accept 1700000000 7 reason=other\n"));
//! ```

pub mod collectors;
pub mod daemon;
pub mod emitter;
pub mod mapping;
pub mod pass;
pub mod startup;

// Re-export main types for convenience
pub use collectors::netstat::{parse_netstat, NetstatError, NetstatTable, NetstatWarning};
pub use collectors::sockstat::{parse_sockstat, SockstatError, SockstatRecord};
pub use daemon::{Collector, ParentWatch, ReparentWatch, Termination, EXIT_DO_NOT_RESTART};
pub use pass::{run_pass, PassReport};
