//! Process setup performed once before the collection loop starts.
//!
//! This module drops root privileges, detaches stdin, opens the kernel
//! statistics files and validates that they can be parsed.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use nix::unistd::{close, geteuid, setgid, setgroups, setuid, User};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::collectors::netstat::parse_netstat;
use crate::collectors::sockstat::parse_sockstat;
use crate::pass::read_source;

pub const DEFAULT_SOCKSTAT_PATH: &str = "/proc/net/sockstat";
pub const DEFAULT_NETSTAT_PATH: &str = "/proc/net/netstat";

/// Number of fields a sockstat record can carry.
const SOCKSTAT_FIELDS: usize = 11;

/// Account the collector switches to when started as root.
pub const DEFAULT_USER: &str = "nobody";

/// Get the system page size in bytes.
fn get_page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        // Returns -1 on error - handled by the > 0 check
        unsafe {
            let size = libc::sysconf(libc::_SC_PAGESIZE);
            if size > 0 {
                return size as u64;
            }
        }
    }
    4096
}

/// System page size (sockstat reports TCP/UDP memory in pages).
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to open {}: {source}", .path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Sockstat(#[from] crate::collectors::sockstat::SockstatError),

    #[error("{0}")]
    Netstat(#[from] crate::collectors::netstat::NetstatError),
}

/// The two kernel files, opened once and kept open for the process lifetime.
pub struct Sources<S, N> {
    pub sockstat: S,
    pub netstat: N,
}

impl Sources<File, File> {
    pub fn open(sockstat_path: &Path, netstat_path: &Path) -> Result<Self, StartupError> {
        let sockstat = open_source(sockstat_path)?;
        let netstat = open_source(netstat_path)?;
        info!(
            "Opened {} and {}",
            sockstat_path.display(),
            netstat_path.display()
        );
        Ok(Self { sockstat, netstat })
    }
}

fn open_source(path: &Path) -> Result<File, StartupError> {
    File::open(path).map_err(|source| StartupError::OpenSource {
        path: path.to_path_buf(),
        source,
    })
}

/// Drop privileges from root to `username`.
///
/// Only happens when running as root and the account exists. A missing
/// account or a failed switch is not fatal: the collector keeps running
/// with its current privileges.
pub fn drop_privileges(username: &str) {
    if !geteuid().is_root() {
        debug!("Not running as root, skipping privilege drop");
        return;
    }

    let user = match User::from_name(username) {
        Ok(Some(u)) => u,
        Ok(None) => {
            info!("User '{}' not found - continuing as root", username);
            return;
        }
        Err(e) => {
            debug!(
                "Failed to lookup user '{}': {} - continuing as root",
                username, e
            );
            return;
        }
    };

    // Drop privileges: clear supplementary groups, then group, then user
    if let Err(e) = setgroups(&[user.gid]) {
        warn!(
            "Failed to clear supplementary groups: {} - continuing as root",
            e
        );
        return;
    }

    if let Err(e) = setgid(user.gid) {
        warn!(
            "Failed to drop group privileges to gid={}: {} - continuing as root",
            user.gid, e
        );
        return;
    }

    if let Err(e) = setuid(user.uid) {
        warn!(
            "Failed to drop user privileges to uid={}: {} - continuing as root",
            user.uid, e
        );
        return;
    }

    info!(
        "Privileges dropped to user '{}' (uid={}, gid={})",
        user.name, user.uid, user.gid
    );
}

/// Closes stdin. The collector never reads interactive input.
pub fn close_stdin() {
    if let Err(e) = close(libc::STDIN_FILENO) {
        debug!("Failed to close stdin: {}", e);
    }
}

/// Opens and parses both sources once, for the `check` subcommand.
///
/// Returns the number of sockstat fields present and the number of netstat
/// sections found.
pub fn validate_sources(
    sockstat_path: &Path,
    netstat_path: &Path,
) -> Result<(usize, usize), StartupError> {
    let mut sources = Sources::open(sockstat_path, netstat_path)?;

    let sockstat = read_source(&mut sources.sockstat).map_err(|source| {
        StartupError::ReadSource {
            path: sockstat_path.to_path_buf(),
            source,
        }
    })?;
    let record = parse_sockstat(&sockstat)?;
    let optional_missing = [record.udp_pages, record.udplite_inuse]
        .iter()
        .filter(|v| v.is_none())
        .count();

    let netstat = read_source(&mut sources.netstat).map_err(|source| {
        StartupError::ReadSource {
            path: netstat_path.to_path_buf(),
            source,
        }
    })?;
    let mut warnings = Vec::new();
    let table = parse_netstat(&netstat, &mut warnings)?;
    for warning in &warnings {
        warn!("{}", warning);
    }

    Ok((SOCKSTAT_FIELDS - optional_missing, table.sections.len()))
}
