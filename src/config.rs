//! Configuration management for netstat-collector.
//!
//! This module handles loading, merging, and validating configuration from files,
//! the environment and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use anyhow::{bail, Context};
use clap::ValueEnum;
use netstat_collector::daemon::DEFAULT_INTERVAL;
use netstat_collector::startup::{
    DEFAULT_NETSTAT_PATH, DEFAULT_SOCKSTAT_PATH, DEFAULT_USER, PAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the interval between passes (seconds).
pub const INTERVAL_ENV: &str = "TCOLLECTOR_SAMPLE_INTERVAL";

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between passes; fractions allowed
    #[serde(alias = "interval")]
    pub interval_seconds: Option<f64>,

    #[serde(alias = "sockstat-path")]
    pub sockstat_path: Option<PathBuf>,
    #[serde(alias = "netstat-path")]
    pub netstat_path: Option<PathBuf>,

    /// Account to switch to when started as root
    pub user: Option<String>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    /// Overrides the detected page size (bytes)
    #[serde(alias = "page-size")]
    pub page_size: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: Some(DEFAULT_INTERVAL.as_secs_f64()),
            sockstat_path: Some(PathBuf::from(DEFAULT_SOCKSTAT_PATH)),
            netstat_path: Some(PathBuf::from(DEFAULT_NETSTAT_PATH)),
            user: Some(DEFAULT_USER.to_string()),
            log_level: Some("info".into()),
            page_size: None,
        }
    }
}

impl Config {
    pub fn interval(&self) -> Duration {
        self.interval_seconds
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn sockstat_path(&self) -> &Path {
        self.sockstat_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SOCKSTAT_PATH))
    }

    pub fn netstat_path(&self) -> &Path {
        self.netstat_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_NETSTAT_PATH))
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or(DEFAULT_USER)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size.unwrap_or(*PAGE_SIZE)
    }

    /// Log level from the config file, if it names a valid level.
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
            .as_deref()
            .and_then(|s| LogLevel::from_str(s, true).ok())
    }
}

/// Something noteworthy that happened while resolving the configuration.
///
/// Resolution runs before the tracing subscriber exists, so these are
/// collected and logged by the caller once logging is set up.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNotice {
    Loaded(PathBuf),
    IgnoredInterval(String),
}

impl fmt::Display for ConfigNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigNotice::Loaded(path) => {
                write!(f, "Loaded configuration from: {}", path.display())
            }
            ConfigNotice::IgnoredInterval(raw) => write!(
                f,
                "Ignoring {}={:?}: not a positive number of seconds",
                INTERVAL_ENV, raw
            ),
        }
    }
}

/// Parses the interval override. Only values that would pass validation are
/// accepted; anything else is ignored so the previous interval is kept.
pub fn parse_interval_override(raw: &str) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Some(v),
        _ => None,
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if let Some(interval) = cfg.interval_seconds {
        if !interval.is_finite() || interval <= 0.0 {
            bail!("interval_seconds must be a positive number, got {}", interval);
        }
    }

    for (name, path) in [
        ("sockstat_path", &cfg.sockstat_path),
        ("netstat_path", &cfg.netstat_path),
    ] {
        if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            bail!("{} must not be empty", name);
        }
    }

    if cfg.page_size == Some(0) {
        bail!("page_size must be greater than 0");
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_str(level, true).is_err() {
            bail!(
                "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                level
            );
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, environment, config file, and defaults.
/// This enforces precedence: CLI > environment > config file > default.
pub fn resolve_config(args: &Args) -> anyhow::Result<(Config, Vec<ConfigNotice>)> {
    let env_interval = std::env::var(INTERVAL_ENV).ok();
    resolve_config_with_env(args, env_interval.as_deref())
}

fn resolve_config_with_env(
    args: &Args,
    env_interval: Option<&str>,
) -> anyhow::Result<(Config, Vec<ConfigNotice>)> {
    let mut notices = Vec::new();
    let mut config = if args.no_config {
        Config::default()
    } else {
        let (config, loaded_from) = load_config(args.config.as_deref())?;
        notices.extend(loaded_from.map(ConfigNotice::Loaded));
        config
    };

    if let Some(raw) = env_interval {
        match parse_interval_override(raw) {
            Some(seconds) => config.interval_seconds = Some(seconds),
            None => notices.push(ConfigNotice::IgnoredInterval(raw.to_string())),
        }
    }

    // Override with CLI args
    if let Some(interval) = args.interval {
        config.interval_seconds = Some(interval);
    }
    if let Some(path) = &args.sockstat_path {
        config.sockstat_path = Some(path.clone());
    }
    if let Some(path) = &args.netstat_path {
        config.netstat_path = Some(path.clone());
    }
    if let Some(user) = &args.user {
        config.user = Some(user.clone());
    }

    Ok((config, notices))
}

/// Configuration loading with multiple format support. Also returns the file
/// the configuration came from, if any.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            // Try default locations
            let defaults = [
                "/etc/netstat-collector/config.yaml",
                "./netstat-collector.yaml",
                "./netstat-collector.json",
                "./netstat-collector.toml",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok((Config::default(), None)),
            }
        }
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = parse_config(&path, &content)?;
    Ok((config, Some(path)))
}

/// Parses config content, choosing the format from the file extension.
/// Fields missing from the file keep their defaults.
fn parse_config(path: &Path, content: &str) -> anyhow::Result<Config> {
    let parsed: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        Some("toml") => toml::from_str(content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?,
        // Default to YAML
        _ => serde_yaml::from_str(content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
    };
    Ok(parsed.merged_over(Config::default()))
}

impl Config {
    fn merged_over(self, base: Config) -> Config {
        Config {
            interval_seconds: self.interval_seconds.or(base.interval_seconds),
            sockstat_path: self.sockstat_path.or(base.sockstat_path),
            netstat_path: self.netstat_path.or(base.netstat_path),
            user: self.user.or(base.user),
            log_level: self.log_level.or(base.log_level),
            page_size: self.page_size.or(base.page_size),
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_config_args() -> Args {
        Args {
            no_config: true,
            ..Args::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(config.sockstat_path(), Path::new("/proc/net/sockstat"));
        assert_eq!(config.netstat_path(), Path::new("/proc/net/netstat"));
        assert_eq!(config.user(), "nobody");
        assert!(validate_effective_config(&config).is_ok());
    }

    #[test]
    fn test_interval_override_parsing() {
        assert_eq!(parse_interval_override("15"), Some(15.0));
        assert_eq!(parse_interval_override(" 0.5 "), Some(0.5));
        assert_eq!(parse_interval_override("fast"), None);
        assert_eq!(parse_interval_override(""), None);
        assert_eq!(parse_interval_override("-1"), None);
        assert_eq!(parse_interval_override("0"), None);
        assert_eq!(parse_interval_override("inf"), None);
    }

    #[test]
    fn test_env_overrides_default() {
        let (config, notices) = resolve_config_with_env(&no_config_args(), Some("2.5")).unwrap();
        assert_eq!(config.interval(), Duration::from_millis(2500));
        assert!(notices.is_empty());
    }

    #[test]
    fn test_invalid_env_keeps_default() {
        let (config, notices) = resolve_config_with_env(&no_config_args(), Some("abc")).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(notices, vec![ConfigNotice::IgnoredInterval("abc".into())]);
    }

    #[test]
    fn test_zero_env_interval_keeps_startable_default() {
        for raw in ["0", "-5", "0.0"] {
            let (config, notices) =
                resolve_config_with_env(&no_config_args(), Some(raw)).unwrap();
            assert_eq!(config.interval(), Duration::from_secs(30));
            assert!(validate_effective_config(&config).is_ok());
            assert_eq!(notices.len(), 1);
            assert!(notices[0].to_string().contains("TCOLLECTOR_SAMPLE_INTERVAL"));
        }
    }

    #[test]
    fn test_loaded_file_is_reported() {
        let path = std::env::temp_dir().join(format!(
            "netstat-collector-config-{}.yaml",
            std::process::id()
        ));
        fs::write(&path, "interval_seconds: 12\n").unwrap();
        let args = Args {
            config: Some(path.clone()),
            ..Args::default()
        };
        let (config, notices) = resolve_config_with_env(&args, None).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.interval(), Duration::from_secs(12));
        assert_eq!(notices, vec![ConfigNotice::Loaded(path)]);
    }

    #[test]
    fn test_cli_wins_over_env() {
        let args = Args {
            interval: Some(5.0),
            sockstat_path: Some(PathBuf::from("/tmp/sockstat")),
            ..no_config_args()
        };
        let (config, _) = resolve_config_with_env(&args, Some("10")).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert_eq!(config.sockstat_path(), Path::new("/tmp/sockstat"));
    }

    #[test]
    fn test_parse_partial_yaml_keeps_defaults() {
        let config = parse_config(Path::new("c.yaml"), "interval_seconds: 10\n").unwrap();
        assert_eq!(config.interval(), Duration::from_secs(10));
        assert_eq!(config.user(), "nobody");
    }

    #[test]
    fn test_parse_json_and_toml() {
        let json = parse_config(Path::new("c.json"), r#"{"user": "collector"}"#).unwrap();
        assert_eq!(json.user(), "collector");

        let toml = parse_config(Path::new("c.toml"), "page_size = 16384\n").unwrap();
        assert_eq!(toml.page_size(), 16384);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_interval = Config {
            interval_seconds: Some(0.0),
            ..Config::default()
        };
        assert!(validate_effective_config(&zero_interval).is_err());

        let zero_page = Config {
            page_size: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&zero_page).is_err());

        let bad_level = Config {
            log_level: Some("loud".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&bad_level).is_err());
    }
}
