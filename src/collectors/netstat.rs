//! Protocol counter table parser.
//!
//! /proc/net/netstat is column oriented. Each section is two lines sharing a
//! header, the first naming the counters and the second holding the values:
//!
//! ```text
//! TcpExt: SyncookiesSent SyncookiesRecv ListenOverflows ListenDrops
//! TcpExt: 0 0 3 10
//! IpExt: InNoRoutes InTruncatedPkts
//! IpExt: 0 0
//! ```
//!
//! Raw headers are folded into logical sections (see [`crate::mapping`]).
//! Lines are collected per logical section by an explicit accumulator, and a
//! section must end up with exactly two lines.

use ahash::AHashMap as HashMap;

use crate::mapping::{logical_section, UNSUPPORTED_HEADER};

/// Counter the kernel inflates with every `ListenOverflows` increment.
pub const LISTEN_DROPS: &str = "ListenDrops";
pub const LISTEN_OVERFLOWS: &str = "ListenOverflows";

/// Fatal-to-the-pass netstat parse errors. Each carries the full file content
/// so format changes can be debugged from the error stream alone.
#[derive(Debug, thiserror::Error)]
pub enum NetstatError {
    #[error(
        "Section {section:?} has {lines} line(s) in /proc/net/netstat, expected 2 (file={content:?})"
    )]
    SectionLineCount {
        section: &'static str,
        lines: usize,
        content: String,
    },

    #[error(
        "Section {section:?} has {names} counter names but {values} values (file={content:?})"
    )]
    ColumnMismatch {
        section: &'static str,
        names: usize,
        values: usize,
        content: String,
    },

    #[error("Counter {counter} in section {section:?} has non-integer value {value:?}")]
    InvalidValue {
        section: &'static str,
        counter: String,
        value: String,
    },
}

/// Non-fatal condition: the line is skipped and parsing continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetstatWarning {
    #[error("Unrecognized line in /proc/net/netstat: {line:?} (file={content:?})")]
    UnknownHeader { line: Vec<String>, content: String },
}

/// One logical section: counter name -> raw value string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetstatSection {
    pub name: &'static str,
    counters: HashMap<String, String>,
}

impl NetstatSection {
    /// Raw value string for `counter`, if the kernel reports it.
    pub fn raw(&self, counter: &str) -> Option<&str> {
        self.counters.get(counter).map(String::as_str)
    }

    /// Numeric value for `counter`.
    pub fn value(&self, counter: &str) -> Result<Option<u64>, NetstatError> {
        match self.raw(counter) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|_| NetstatError::InvalidValue {
                    section: self.name,
                    counter: counter.to_string(),
                    value: raw.to_string(),
                }),
            None => Ok(None),
        }
    }
}

/// All sections of one read, in the order they first appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetstatTable {
    pub sections: Vec<NetstatSection>,
}

impl NetstatTable {
    pub fn section(&self, name: &str) -> Option<&NetstatSection> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Per-section accumulator state.
#[derive(Debug)]
enum SectionState {
    /// Name line seen, value line pending.
    AwaitingValues { names: Vec<String> },
    /// Both lines seen.
    Complete { counters: HashMap<String, String> },
    /// More than two lines seen.
    Overfull { lines: usize },
}

#[derive(Debug)]
struct SectionAccumulator {
    name: &'static str,
    state: SectionState,
}

impl SectionAccumulator {
    fn new(name: &'static str, names: Vec<String>) -> Self {
        Self {
            name,
            state: SectionState::AwaitingValues { names },
        }
    }

    fn push(&mut self, tokens: Vec<String>, content: &str) -> Result<(), NetstatError> {
        let next = match std::mem::replace(&mut self.state, SectionState::Overfull { lines: 0 }) {
            SectionState::AwaitingValues { names } => {
                if names.len() != tokens.len() {
                    return Err(NetstatError::ColumnMismatch {
                        section: self.name,
                        names: names.len(),
                        values: tokens.len(),
                        content: content.to_string(),
                    });
                }
                SectionState::Complete {
                    counters: names.into_iter().zip(tokens).collect(),
                }
            }
            SectionState::Complete { .. } => SectionState::Overfull { lines: 3 },
            SectionState::Overfull { lines } => SectionState::Overfull { lines: lines + 1 },
        };
        self.state = next;
        Ok(())
    }

    fn finish(self, content: &str) -> Result<NetstatSection, NetstatError> {
        let lines = match self.state {
            SectionState::Complete { counters } => {
                return Ok(NetstatSection {
                    name: self.name,
                    counters,
                })
            }
            SectionState::AwaitingValues { .. } => 1,
            SectionState::Overfull { lines } => lines,
        };
        Err(NetstatError::SectionLineCount {
            section: self.name,
            lines,
            content: content.to_string(),
        })
    }
}

/// Parses the full content of /proc/net/netstat.
///
/// Unknown headers are pushed onto `warnings` and skipped. Any section that
/// does not end up with exactly one name line and one value line of equal
/// width fails the whole parse. `ListenDrops` is corrected before returning.
pub fn parse_netstat(
    content: &str,
    warnings: &mut Vec<NetstatWarning>,
) -> Result<NetstatTable, NetstatError> {
    let mut accumulators: Vec<SectionAccumulator> = Vec::new();
    let mut index: HashMap<&'static str, usize> = HashMap::new();

    for line in content.lines() {
        let mut tokens = line.split_whitespace();
        let header = match tokens.next() {
            Some(h) => h,
            None => continue,
        };

        if header == UNSUPPORTED_HEADER {
            continue;
        }

        let section = match logical_section(header) {
            Some(s) => s,
            None => {
                warnings.push(NetstatWarning::UnknownHeader {
                    line: line.split_whitespace().map(str::to_string).collect(),
                    content: content.to_string(),
                });
                continue;
            }
        };

        let tokens: Vec<String> = tokens.map(str::to_string).collect();
        match index.get(section) {
            Some(&i) => accumulators[i].push(tokens, content)?,
            None => {
                index.insert(section, accumulators.len());
                accumulators.push(SectionAccumulator::new(section, tokens));
            }
        }
    }

    let mut sections = accumulators
        .into_iter()
        .map(|acc| acc.finish(content))
        .collect::<Result<Vec<_>, _>>()?;

    for section in &mut sections {
        correct_counters(section)?;
    }

    Ok(NetstatTable { sections })
}

/// Undoes the kernel's double counting: `ListenDrops` includes every
/// `ListenOverflows` increment. A missing `ListenOverflows` counts as 0.
pub fn correct_counters(section: &mut NetstatSection) -> Result<(), NetstatError> {
    let drops = match section.value(LISTEN_DROPS)? {
        Some(v) => v,
        None => return Ok(()),
    };
    let overflows = section.value(LISTEN_OVERFLOWS)?.unwrap_or(0);

    section.counters.insert(
        LISTEN_DROPS.to_string(),
        drops.saturating_sub(overflows).to_string(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> (Result<NetstatTable, NetstatError>, Vec<NetstatWarning>) {
        let mut warnings = Vec::new();
        let result = parse_netstat(content, &mut warnings);
        (result, warnings)
    }

    #[test]
    fn test_pairs_names_with_values() {
        let content = "TcpExt: SyncookiesSent TCPBacklogDrop\n\
                       TcpExt: 4 9\n\
                       IpExt: InNoRoutes\n\
                       IpExt: 0\n";
        let (result, warnings) = parse(content);
        let table = result.unwrap();

        assert!(warnings.is_empty());
        assert_eq!(table.sections.len(), 2);
        assert_eq!(table.sections[0].name, "tcp");
        assert_eq!(table.sections[1].name, "ip");

        let tcp = table.section("tcp").unwrap();
        assert_eq!(tcp.raw("SyncookiesSent"), Some("4"));
        assert_eq!(tcp.value("TCPBacklogDrop").unwrap(), Some(9));
        assert_eq!(tcp.value("Missing").unwrap(), None);
    }

    #[test]
    fn test_listen_drops_is_corrected() {
        let content = "TcpExt: ListenOverflows ListenDrops\nTcpExt: 3 10\n";
        let (result, _) = parse(content);
        let table = result.unwrap();
        let tcp = table.section("tcp").unwrap();
        assert_eq!(tcp.value(LISTEN_DROPS).unwrap(), Some(7));
        assert_eq!(tcp.value(LISTEN_OVERFLOWS).unwrap(), Some(3));
    }

    #[test]
    fn test_listen_drops_without_overflows() {
        let content = "TcpExt: ListenDrops\nTcpExt: 10\n";
        let (result, _) = parse(content);
        let table = result.unwrap();
        assert_eq!(table.sections[0].value(LISTEN_DROPS).unwrap(), Some(10));
    }

    #[test]
    fn test_unknown_header_warns_once_and_is_skipped() {
        let content = "Bogus: A B\nTcpExt: OutRsts\nTcpExt: 1\n";
        let (result, warnings) = parse(content);
        let table = result.unwrap();

        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            NetstatWarning::UnknownHeader { line, .. } => {
                assert_eq!(line, &vec!["Bogus:", "A", "B"]);
            }
        }
        assert_eq!(table.sections.len(), 1);
    }

    #[test]
    fn test_unsupported_header_is_silent() {
        let content = "MPTcpExt: MPCapableSYNRX\nMPTcpExt: 0\nTcpExt: OutRsts\nTcpExt: 1\n";
        let (result, warnings) = parse(content);
        assert!(warnings.is_empty());
        assert_eq!(result.unwrap().sections.len(), 1);
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let content = "\nTcpExt: OutRsts\n   \nTcpExt: 1\n\n";
        let (result, _) = parse(content);
        assert_eq!(result.unwrap().sections[0].value("OutRsts").unwrap(), Some(1));
    }

    #[test]
    fn test_single_line_section_is_fatal() {
        let content = "TcpExt: OutRsts\nIpExt: InNoRoutes\nIpExt: 0\n";
        match parse(content).0 {
            Err(NetstatError::SectionLineCount { section, lines, .. }) => {
                assert_eq!(section, "tcp");
                assert_eq!(lines, 1);
            }
            other => panic!("expected line count error, got {:?}", other),
        }
    }

    #[test]
    fn test_aliased_headers_overfill_section() {
        // Tcp: and TcpExt: fold into the same logical section.
        let content = "TcpExt: OutRsts\nTcpExt: 1\nTcp: InErrs\nTcp: 2\n";
        match parse(content).0 {
            Err(NetstatError::SectionLineCount { section, lines, .. }) => {
                assert_eq!(section, "tcp");
                assert_eq!(lines, 4);
            }
            other => panic!("expected line count error, got {:?}", other),
        }
    }

    #[test]
    fn test_three_lines_is_fatal() {
        let content = "Udp: InErrs\nUdp: 1\nUdp: 2\n";
        assert!(matches!(
            parse(content).0,
            Err(NetstatError::SectionLineCount { lines: 3, .. })
        ));
    }

    #[test]
    fn test_column_mismatch_is_fatal() {
        let content = "TcpExt: OutRsts InErrs\nTcpExt: 1\n";
        match parse(content).0 {
            Err(NetstatError::ColumnMismatch { names, values, .. }) => {
                assert_eq!(names, 2);
                assert_eq!(values, 1);
            }
            other => panic!("expected column mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_listen_drops_is_fatal() {
        let content = "TcpExt: ListenOverflows ListenDrops\nTcpExt: 3 many\n";
        assert!(matches!(
            parse(content).0,
            Err(NetstatError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_non_numeric_value_kept_raw() {
        let content = "Tcp: MaxConn\nTcp: -1\n";
        let table = parse(content).0.unwrap();
        let tcp = &table.sections[0];
        assert_eq!(tcp.raw("MaxConn"), Some("-1"));
        assert!(tcp.value("MaxConn").is_err());
    }
}
