//! Static tables translating /proc/net/netstat names into metric names.
//!
//! Two tables live here:
//! - the section header table, folding raw line headers such as `TcpExt:`
//!   into a logical section name (`tcp`), and
//! - the counter table, mapping a raw kernel counter to a metric suffix and
//!   an optional tag.
//!
//! Counters missing from the counter table are not surfaced. That is
//! filtering, not an error.

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;

/// Namespace prefix for every netstat-derived metric.
pub const NETSTAT_NAMESPACE: &str = "net.stat";

/// Header that is present on recent kernels but intentionally not collected.
pub const UNSUPPORTED_HEADER: &str = "MPTcpExt:";

/// Raw section header token -> logical section name.
///
/// Several headers may fold into one logical section. Only `TcpExt:` and
/// `Udp:` carry counters that the counter table knows about today.
pub const SECTION_HEADERS: &[(&str, &str)] = &[
    ("TcpExt:", "tcp"),
    ("IpExt:", "ip"),
    ("Ip:", "ip"),
    ("Icmp:", "icmp"),
    ("IcmpMsg:", "icmpmsg"),
    ("Tcp:", "tcp"),
    ("Udp:", "udp"),
    ("UdpLite:", "udplite"),
    ("Arista:", "arista"),
];

/// One entry of the counter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterMapping {
    pub counter: &'static str,
    pub metric: &'static str,
    pub tags: Option<&'static str>,
}

const fn entry(
    counter: &'static str,
    metric: &'static str,
    tags: Option<&'static str>,
) -> CounterMapping {
    CounterMapping {
        counter,
        metric,
        tags,
    }
}

/// Raw kernel counter -> (metric suffix, tag). Emission order follows this
/// table.
pub const COUNTER_MAPPINGS: &[CounterMapping] = &[
    // An application wasn't able to accept a connection fast enough, so the
    // kernel couldn't queue it. Instead of dropping it, a cookie was sent to
    // the client.
    entry("SyncookiesSent", "syncookies", Some("type=sent")),
    // A cookie came back and passed the check.
    entry("SyncookiesRecv", "syncookies", Some("type=received")),
    // A cookie came back but looked invalid.
    entry("SyncookiesFailed", "syncookies", Some("type=failed")),
    // A socket used too much receive memory and its out-of-order queue
    // (SACK) was discarded first.
    entry("OfoPruned", "memory.prune", Some("type=drop_ofo_queue")),
    // Even after dropping the ofo queue there was no memory, so the received
    // packet itself was discarded. Really bad.
    entry("RcvPruned", "memory.prune", Some("type=drop_received")),
    // No further packet showed up, so a timer sent the delayed ACK.
    entry("DelayedACKs", "delayedack", Some("type=sent")),
    // A delayed ACK could not be sent because the socket was locked; the
    // timer was reset.
    entry("DelayedACKLocked", "delayedack", Some("type=locked")),
    // A delayed and duplicated ACK was sent because the peer retransmitted.
    entry("DelayedACKLost", "delayedack", Some("type=lost")),
    // The 3WHS completed but the accept queue was full, so the connection
    // was discarded.
    entry("ListenOverflows", "failed_accept", Some("reason=full_acceptq")),
    // A connection could not be accepted: no route, socket allocation
    // failure or bind bucket allocation failure. The kernel also counts
    // every ListenOverflows here; that part is subtracted before emission.
    entry("ListenDrops", "failed_accept", Some("reason=other")),
    // Recovered from packet loss after a fast retransmit.
    entry("TCPRenoRecovery", "packetloss.recovery", Some("type=fast_retransmit")),
    // Recovered from packet loss using selective acknowledgements.
    entry("TCPSackRecovery", "packetloss.recovery", Some("type=sack")),
    // Re-ordering detected with FACK (highest sequence number known to be
    // received by the peer when using SACK).
    entry("TCPFACKReorder", "reording", Some("detectedby=fack")),
    // Re-ordering detected with SACK.
    entry("TCPSACKReorder", "reording", Some("detectedby=sack")),
    // Re-ordering detected with fast retransmit.
    entry("TCPRenoReorder", "reording", Some("detectedby=fast_retransmit")),
    // Re-ordering detected with the timestamp option.
    entry("TCPTSReorder", "reording", Some("detectedby=timestamp")),
    // Erroneous retransmits detected; the CWND reduction was fully undone.
    entry("TCPFullUndo", "congestion.recovery", Some("type=full_undo")),
    // A partial ACK arrived during fast retransmit, so part of the CWND
    // reduction was undone.
    entry("TCPPartialUndo", "congestion.recovery", Some("type=hoe_heuristic")),
    // A D-SACK acknowledged all retransmitted data; CWND reduction undone.
    entry("TCPDSACKUndo", "congestion.recovery", Some("type=sack")),
    // A partial ACK arrived; CWND reduction undone.
    entry("TCPLossUndo", "congestion.recovery", Some("type=ack")),
    // Unexpected SYN received, RST sent to the peer.
    entry("TCPAbortOnSyn", "abort", Some("type=unexpected_syn")),
    // Data beyond the last sequence number arrived in FIN_WAIT1, RST sent.
    entry("TCPAbortOnData", "abort", Some("type=data_after_fin_wait1")),
    // Data arrived after the user closed the socket, RST sent.
    entry("TCPAbortOnClose", "abort", Some("type=data_after_close")),
    // Too many orphaned sockets, a connection had to be dropped. Really bad.
    entry("TCPAbortOnMemory", "abort", Some("type=out_of_memory")),
    // The connection timed out really hard.
    entry("TCPAbortOnTimeout", "abort", Some("type=timeout")),
    // A socket closed by the application lingered long enough to be killed.
    entry("TCPAbortOnLinger", "abort", Some("type=linger")),
    // Sending a reset during one of the aborts above failed, e.g. for lack
    // of memory. Very bad.
    entry("TCPAbortFailed", "abort.failed", None),
    // A socket entered "memory pressure" after a non fatal allocation
    // failure (send buffer shrunk etc).
    entry("TCPMemoryPressures", "memory.pressure", None),
    // A completely invalid SACK block was discarded.
    entry("TCPSACKDiscard", "invalid_sack", Some("type=invalid")),
    // A duplicate SACK arrived while retransmitting and was discarded.
    entry("TCPDSACKIgnoredOld", "invalid_sack", Some("type=retransmit")),
    // A duplicate SACK was discarded.
    entry("TCPDSACKIgnoredNoUndo", "invalid_sack", Some("type=olddup")),
    // Received data dropped because the socket's receive queue was full.
    entry("TCPBacklogDrop", "receive.queue.full", None),
    // TCP segments sent with the RST flag.
    entry("OutRsts", "resets", Some("direction=out")),
    // Segments received in error (bad checksums etc).
    entry("InErrs", "errors", Some("direction=in")),
];

static SECTION_INDEX: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| SECTION_HEADERS.iter().copied().collect());

static COUNTER_INDEX: Lazy<HashMap<&'static str, &'static CounterMapping>> =
    Lazy::new(|| COUNTER_MAPPINGS.iter().map(|m| (m.counter, m)).collect());

/// A counter resolved to its output name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedMetric {
    /// `net.stat.<section>`
    pub namespace: String,
    pub metric: &'static str,
    pub tags: Option<&'static str>,
}

/// Folds a raw header token (e.g. `TcpExt:`) into its logical section.
pub fn logical_section(header: &str) -> Option<&'static str> {
    SECTION_INDEX.get(header).copied()
}

/// Looks up the counter table entry for a raw counter name.
pub fn counter_mapping(counter: &str) -> Option<&'static CounterMapping> {
    COUNTER_INDEX.get(counter).copied()
}

/// `net.stat.<section>`
pub fn section_namespace(section: &str) -> String {
    format!("{}.{}", NETSTAT_NAMESPACE, section)
}

/// Resolves `counter` in logical `section` to a metric, or `None` when the
/// counter is not surfaced.
pub fn lookup(section: &str, counter: &str) -> Option<MappedMetric> {
    counter_mapping(counter).map(|m| MappedMetric {
        namespace: section_namespace(section),
        metric: m.metric,
        tags: m.tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_fold_into_logical_sections() {
        assert_eq!(logical_section("TcpExt:"), Some("tcp"));
        assert_eq!(logical_section("Tcp:"), Some("tcp"));
        assert_eq!(logical_section("IpExt:"), Some("ip"));
        assert_eq!(logical_section("Udp:"), Some("udp"));
        assert_eq!(logical_section("MPTcpExt:"), None);
        assert_eq!(logical_section("TcpExt"), None);
    }

    #[test]
    fn test_lookup_known_counter() {
        let mapped = lookup("tcp", "ListenOverflows").unwrap();
        assert_eq!(mapped.namespace, "net.stat.tcp");
        assert_eq!(mapped.metric, "failed_accept");
        assert_eq!(mapped.tags, Some("reason=full_acceptq"));
    }

    #[test]
    fn test_lookup_untagged_counter() {
        let mapped = lookup("tcp", "TCPBacklogDrop").unwrap();
        assert_eq!(mapped.metric, "receive.queue.full");
        assert_eq!(mapped.tags, None);
    }

    #[test]
    fn test_section_namespace() {
        assert_eq!(section_namespace("udp"), "net.stat.udp");
        assert_eq!(
            lookup("udp", "OutRsts").map(|m| m.namespace),
            Some(section_namespace("udp"))
        );
    }

    #[test]
    fn test_lookup_unknown_counter() {
        assert!(lookup("tcp", "TCPHPHits").is_none());
        assert!(lookup("udp", "").is_none());
    }

    #[test]
    fn test_counter_table_has_no_duplicates() {
        assert_eq!(COUNTER_INDEX.len(), COUNTER_MAPPINGS.len());
    }
}
