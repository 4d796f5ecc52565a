//! One read-parse-emit cycle over both sources.
//!
//! A pass never fails because of the kernel files: a garbled sockstat read
//! drops the sockstat metrics, a broken netstat table drops the netstat
//! metrics, and both conditions are reported on the error stream. Only a
//! failure to write the output streams is returned as an error.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::collectors::netstat::{parse_netstat, NetstatTable};
use crate::collectors::sockstat::{parse_sockstat, SockstatRecord};
use crate::emitter::Emitter;
use crate::mapping::{section_namespace, COUNTER_MAPPINGS};

/// Namespace prefix for every sockstat-derived metric.
pub const SOCKSTAT_NAMESPACE: &str = "net.sockstat";

/// Outcome of a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub timestamp: i64,
    /// Lines written to the success stream.
    pub emitted: usize,
    /// Lines written to the error stream.
    pub diagnostics: usize,
    pub sockstat_ok: bool,
    pub netstat_ok: bool,
}

/// Rewinds a kept-open source and reads it again from the start. The kernel
/// regenerates the content on every read.
pub fn read_source<R: Read + Seek>(source: &mut R) -> io::Result<String> {
    source.seek(SeekFrom::Start(0))?;
    let mut content = String::new();
    source.read_to_string(&mut content)?;
    Ok(content)
}

/// Runs one pass: sockstat first, then netstat, all stamped with `timestamp`.
pub fn run_pass<S, N, O, E>(
    sockstat: &mut S,
    netstat: &mut N,
    out: O,
    err: E,
    timestamp: i64,
    page_size: u64,
) -> io::Result<PassReport>
where
    S: Read + Seek,
    N: Read + Seek,
    O: Write,
    E: Write,
{
    let mut emitter = Emitter::new(out, err, timestamp);
    let mut report = PassReport {
        timestamp,
        ..PassReport::default()
    };

    match read_source(sockstat) {
        Ok(content) => match parse_sockstat(&content) {
            Ok(record) => {
                emit_sockstat(&mut emitter, &record, page_size)?;
                report.sockstat_ok = true;
            }
            Err(e) => emitter.error(e)?,
        },
        Err(e) => emitter.error(format_args!("Failed to read sockstat: {}", e))?,
    }

    match read_source(netstat) {
        Ok(content) => {
            let mut warnings = Vec::new();
            let parsed = parse_netstat(&content, &mut warnings);
            for warning in &warnings {
                emitter.error(warning)?;
            }
            match parsed {
                Ok(table) => {
                    emit_netstat(&mut emitter, &table)?;
                    report.netstat_ok = true;
                }
                Err(e) => emitter.error(format_args!("Aborting netstat for this pass: {}", e))?,
            }
        }
        Err(e) => emitter.error(format_args!("Failed to read netstat: {}", e))?,
    }

    emitter.flush()?;

    report.emitted = emitter.emitted();
    report.diagnostics = emitter.diagnostics();
    debug!(
        "Pass at {} emitted {} metrics with {} diagnostics",
        timestamp, report.emitted, report.diagnostics
    );
    Ok(report)
}

/// Writes the sockstat metrics. Page counts are converted to bytes.
pub fn emit_sockstat<O: Write, E: Write>(
    emitter: &mut Emitter<O, E>,
    record: &SockstatRecord,
    page_size: u64,
) -> io::Result<()> {
    let ns = SOCKSTAT_NAMESPACE;
    // alloc vs inuse: sockets allocated vs sockets actually in use.
    emitter.emit(ns, "num_sockets", Some(record.tcp_sockets), Some("type=tcp"))?;
    emitter.emit(ns, "num_timewait", Some(record.tw_count), None)?;
    emitter.emit(ns, "sockets_inuse", Some(record.tcp_inuse), Some("type=tcp"))?;
    emitter.emit(ns, "sockets_inuse", Some(record.udp_inuse), Some("type=udp"))?;
    emitter.emit(ns, "sockets_inuse", record.udplite_inuse, Some("type=udplite"))?;
    emitter.emit(ns, "sockets_inuse", Some(record.raw_inuse), Some("type=raw"))?;
    emitter.emit(ns, "num_orphans", Some(record.orphans), None)?;
    emitter.emit(
        ns,
        "memory",
        Some(record.tcp_pages.saturating_mul(page_size)),
        Some("type=tcp"),
    )?;
    emitter.emit(
        ns,
        "memory",
        record.udp_pages.map(|pages| pages.saturating_mul(page_size)),
        Some("type=udp"),
    )?;
    emitter.emit(ns, "memory", Some(record.ip_frag_mem), Some("type=ipfrag"))?;
    emitter.emit(ns, "ipfragqueues", Some(record.ip_frag_nqueues), None)?;
    Ok(())
}

/// Writes every mapped counter of every section, in counter table order.
/// A mapped counter with a non-integer value is reported and skipped.
pub fn emit_netstat<O: Write, E: Write>(
    emitter: &mut Emitter<O, E>,
    table: &NetstatTable,
) -> io::Result<()> {
    for section in &table.sections {
        let namespace = section_namespace(section.name);
        for mapping in COUNTER_MAPPINGS {
            let value = match section.value(mapping.counter) {
                Ok(Some(v)) => v,
                Ok(None) => continue,
                Err(e) => {
                    emitter.error(e)?;
                    continue;
                }
            };
            emitter.emit(&namespace, mapping.metric, Some(value), mapping.tags)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SOCKSTAT: &str = "sockets: used 42\n\
        TCP: inuse 5 orphan 1 tw 2 alloc 5 mem 10\n\
        UDP: inuse 3\n\
        RAW: inuse 0\n\
        FRAG: inuse 0 memory 0\n";

    fn pass(sockstat: &str, netstat: &str) -> (PassReport, String, String) {
        let mut s = Cursor::new(sockstat.as_bytes().to_vec());
        let mut n = Cursor::new(netstat.as_bytes().to_vec());
        let mut out = Vec::new();
        let mut err = Vec::new();
        let report = run_pass(&mut s, &mut n, &mut out, &mut err, 1000, 4096).unwrap();
        (
            report,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_read_source_rewinds() {
        let mut source = Cursor::new(b"abc".to_vec());
        assert_eq!(read_source(&mut source).unwrap(), "abc");
        assert_eq!(read_source(&mut source).unwrap(), "abc");
    }

    #[test]
    fn test_sockstat_order_and_values() {
        let (report, out, err) = pass(SOCKSTAT, "");
        let expected = "net.sockstat.num_sockets 1000 5 type=tcp\n\
            net.sockstat.num_timewait 1000 2\n\
            net.sockstat.sockets_inuse 1000 5 type=tcp\n\
            net.sockstat.sockets_inuse 1000 3 type=udp\n\
            net.sockstat.sockets_inuse 1000 0 type=raw\n\
            net.sockstat.num_orphans 1000 1\n\
            net.sockstat.memory 1000 40960 type=tcp\n\
            net.sockstat.memory 1000 0 type=ipfrag\n\
            net.sockstat.ipfragqueues 1000 0\n";
        assert_eq!(out, expected);
        assert!(err.is_empty());
        assert!(report.sockstat_ok);
        assert!(report.netstat_ok);
        assert_eq!(report.emitted, 9);
    }

    #[test]
    fn test_bad_sockstat_still_emits_netstat() {
        let (report, out, err) = pass("nonsense\n", "TcpExt: OutRsts\nTcpExt: 4\n");
        assert_eq!(out, "net.stat.tcp.resets 1000 4 direction=out\n");
        assert!(err.starts_with("Cannot parse sockstat: "));
        assert!(!report.sockstat_ok);
        assert!(report.netstat_ok);
    }

    #[test]
    fn test_netstat_order_follows_counter_table() {
        let netstat = "TcpExt: TCPBacklogDrop SyncookiesSent\nTcpExt: 7 1\n";
        let (_, out, _) = pass("", netstat);
        assert_eq!(
            out,
            "net.stat.tcp.syncookies 1000 1 type=sent\n\
             net.stat.tcp.receive.queue.full 1000 7\n"
        );
    }

    #[test]
    fn test_each_section_uses_its_own_namespace() {
        let netstat = "TcpExt: OutRsts\nTcpExt: 3\nUdp: OutRsts InDatagrams\nUdp: 5 9\n";
        let (report, out, _) = pass("", netstat);
        assert_eq!(
            out,
            "net.stat.tcp.resets 1000 3 direction=out\n\
             net.stat.udp.resets 1000 5 direction=out\n"
        );
        assert!(report.netstat_ok);
        assert_eq!(report.emitted, 2);
    }

    #[test]
    fn test_invalid_mapped_value_is_reported_and_skipped() {
        let netstat = "Tcp: InErrs OutRsts\nTcp: x 2\n";
        let (_, out, err) = pass("", netstat);
        assert_eq!(out, "net.stat.tcp.resets 1000 2 direction=out\n");
        assert!(err.contains("InErrs"));
    }
}
