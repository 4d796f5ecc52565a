//! Collectors module for kernel network statistics.
//!
//! This module contains the parsers for /proc/net/sockstat (socket
//! allocation summary) and /proc/net/netstat (protocol event counters).

pub mod netstat;
pub mod sockstat;
