//! netstat-collector - version 0.1.0
//!
//! Socket allocation and protocol counter collector with tracing logging.
//! This is the main entry point that resolves configuration, handles
//! subcommands and runs the collection loop.
//!
//! Exit codes: 13 asks the supervisor not to restart us (a source file
//! cannot be opened), 1 means the parent is gone or an unexpected failure
//! happened.

mod cli;
mod commands;
mod config;

use clap::Parser;
use std::io::{self, BufWriter};
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_once};
use config::{resolve_config, show_config, validate_effective_config, Config, ConfigNotice};
use netstat_collector::daemon::{Collector, ReparentWatch};

/// Initializes tracing logging subsystem with configured log level.
///
/// Logs always go to stderr: stdout carries the metric stream.
fn setup_logging(config: &Config, args: &Args) {
    let log_level = args
        .log_level
        .or_else(|| config.log_level())
        .unwrap_or(LogLevel::Info);

    let max_level = match log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", log_level);
}

/// Runs the collection loop until the parent goes away. Returns the exit code.
fn run_daemon(config: &Config) -> anyhow::Result<i32> {
    let watch = ReparentWatch::new();
    if watch.started_under_init() {
        warn!("Parent is init; a supervisor that already exited will not be detected");
    }

    let mut collector = match Collector::start(
        config.sockstat_path(),
        config.netstat_path(),
        config.user(),
        watch,
        config.interval(),
        config.page_size(),
    ) {
        Ok(c) => c,
        Err(termination) => return Ok(termination.exit_code()),
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut err = io::stderr().lock();

    let termination = collector.run(&mut out, &mut err)?;
    Ok(termination.exit_code())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let (config, notices) = resolve_config(&args)?;
        for notice in &notices {
            eprintln!("{}", notice);
        }

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    let (config, notices) = resolve_config(&args)?;

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config, &args);

    for notice in &notices {
        match notice {
            ConfigNotice::Loaded(_) => info!("{}", notice),
            ConfigNotice::IgnoredInterval(_) => warn!("{}", notice),
        }
    }

    info!(
        "Starting netstat-collector (built {})",
        env!("VERGEN_BUILD_TIMESTAMP")
    );

    let code = match &args.command {
        Some(Commands::Check) => command_check(&config),
        Some(Commands::Once) => command_once(&config)?,
        None => run_daemon(&config)?,
    };

    match code {
        0 => info!("netstat-collector stopped"),
        netstat_collector::EXIT_DO_NOT_RESTART => {
            error!("Exiting with code {} (do not restart)", code)
        }
        _ => warn!("Exiting with code {}", code),
    }
    std::process::exit(code);
}
