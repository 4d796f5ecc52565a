//! CLI arguments and subcommands for netstat-collector.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug, Default)]
#[command(
    name = "netstat-collector",
    about = "Socket allocation and protocol counter collector",
    long_about = "Socket allocation and protocol counter collector.\n\n\
                  Reads /proc/net/sockstat and /proc/net/netstat every interval and writes \
                  net.sockstat.* and net.stat.* metric lines to stdout for a tcollector-style \
                  supervisor. Diagnostics and logs go to stderr.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (default: info, or log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Seconds between passes (overrides TCOLLECTOR_SAMPLE_INTERVAL)
    #[arg(short = 'i', long)]
    pub interval: Option<f64>,

    /// Path of the socket allocation summary
    #[arg(long)]
    pub sockstat_path: Option<PathBuf>,

    /// Path of the protocol counter table
    #[arg(long)]
    pub netstat_path: Option<PathBuf>,

    /// Account to switch to when started as root
    #[arg(long)]
    pub user: Option<String>,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

impl Default for ConfigFormat {
    fn default() -> Self {
        ConfigFormat::Yaml
    }
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single pass and exit
    Once,

    /// Check that both sources can be opened and parsed
    Check,
}
