//! Socket allocation statistics parser.
//!
//! This module parses the content of /proc/net/sockstat into a
//! [`SockstatRecord`]. The file has a fixed line layout, but some fields only
//! exist on newer kernels:
//!
//! ```text
//! sockets: used 42
//! TCP: inuse 5 orphan 1 tw 2 alloc 5 mem 10
//! UDP: inuse 3 mem 1          <- "mem" since v2.6.25-rc1
//! UDPLITE: inuse 0            <- whole line since v2.6.20-rc2
//! RAW: inuse 0
//! FRAG: inuse 0 memory 0
//! ```
//!
//! The first line is discarded: it accounts for some socket types but not
//! others, and what it includes is not documented.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Anchored grammar for the whole sockstat file. Content after the FRAG line
/// is ignored so newer kernels appending lines still parse.
static SOCKSTAT_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\Asockets: used [0-9]+\n",
        r"TCP: inuse (?P<tcp_inuse>[0-9]+) orphan (?P<orphans>[0-9]+)",
        r" tw (?P<tw_count>[0-9]+) alloc (?P<tcp_sockets>[0-9]+)",
        r" mem (?P<tcp_pages>[0-9]+)\n",
        r"UDP: inuse (?P<udp_inuse>[0-9]+)",
        r"(?: mem (?P<udp_pages>[0-9]+))?\n",
        r"(?:UDPLITE: inuse (?P<udplite_inuse>[0-9]+)\n)?",
        r"RAW: inuse (?P<raw_inuse>[0-9]+)\n",
        r"FRAG: inuse (?P<ip_frag_nqueues>[0-9]+)",
        r" memory (?P<ip_frag_mem>[0-9]+)\n",
    ))
    .expect("sockstat grammar is a valid regex")
});

/// Socket allocation counters from a single read of /proc/net/sockstat.
///
/// Memory fields are reported as the kernel reports them: `tcp_pages` and
/// `udp_pages` in pages, `ip_frag_mem` in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SockstatRecord {
    pub tcp_inuse: u64,
    pub orphans: u64,
    pub tw_count: u64,
    pub tcp_sockets: u64,
    pub tcp_pages: u64,
    pub udp_inuse: u64,
    /// `None` on kernels without UDP memory accounting.
    pub udp_pages: Option<u64>,
    /// `None` on kernels without UDP-Lite.
    pub udplite_inuse: Option<u64>,
    pub raw_inuse: u64,
    pub ip_frag_nqueues: u64,
    pub ip_frag_mem: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SockstatError {
    #[error("Cannot parse sockstat: {content:?}")]
    Grammar { content: String },

    #[error("Sockstat field {field} out of range in {content:?}")]
    OutOfRange { field: &'static str, content: String },
}

/// Parses the full content of /proc/net/sockstat.
pub fn parse_sockstat(content: &str) -> Result<SockstatRecord, SockstatError> {
    let caps = SOCKSTAT_GRAMMAR
        .captures(content)
        .ok_or_else(|| SockstatError::Grammar {
            content: content.to_string(),
        })?;

    let required = |field: &'static str| -> Result<u64, SockstatError> {
        optional_field(&caps, field, content)?.ok_or_else(|| SockstatError::Grammar {
            content: content.to_string(),
        })
    };

    Ok(SockstatRecord {
        tcp_inuse: required("tcp_inuse")?,
        orphans: required("orphans")?,
        tw_count: required("tw_count")?,
        tcp_sockets: required("tcp_sockets")?,
        tcp_pages: required("tcp_pages")?,
        udp_inuse: required("udp_inuse")?,
        udp_pages: optional_field(&caps, "udp_pages", content)?,
        udplite_inuse: optional_field(&caps, "udplite_inuse", content)?,
        raw_inuse: required("raw_inuse")?,
        ip_frag_nqueues: required("ip_frag_nqueues")?,
        ip_frag_mem: required("ip_frag_mem")?,
    })
}

fn optional_field(
    caps: &Captures<'_>,
    field: &'static str,
    content: &str,
) -> Result<Option<u64>, SockstatError> {
    match caps.name(field) {
        Some(m) => m
            .as_str()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SockstatError::OutOfRange {
                field,
                content: content.to_string(),
            }),
        None => Ok(None),
    }
}
