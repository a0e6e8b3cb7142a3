//! Configuration management for cg-stat-collector.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats. Sources and
//! targets are configured as short spec strings (`cgroupfs,/sys/fs/cgroup`,
//! `netsyslog,tcp://logs:514`) that are parsed into [`SourceSpec`] and
//! [`TargetSpec`] and then built into a [`Collector`].

use crate::cli::{Args, ConfigFormat, LogLevel};
use crate::collector::{Collector, Source, Target};
use crate::convert::ClockTicks;
use crate::error::CollectorError;
use crate::sources::cgroup::{ReadSettings, DEFAULT_CONTROLLERS, DEFAULT_MOUNT_POINT};
use crate::sources::ps::{DEFAULT_NO_VALUE, DEFAULT_PS_PATH};
use crate::sources::{CgroupFilesystem, CommandSource, PsSource};
use crate::targets::elastic::{DEFAULT_INDEX_FORMAT, DEFAULT_URL};
use crate::targets::syslog::{DEFAULT_APP_NAME, DEFAULT_NET_SYSLOG};
use crate::targets::{Console, Elasticsearch, NetSyslog, Syslog, SyslogEndpoint};
use chrono::format::{Item, StrftimeItems};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

// Default configuration constants
pub const DEFAULT_INTERVAL: f64 = 0.0;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Effective configuration. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source spec strings
    pub sources: Option<Vec<String>>,
    /// Target spec strings
    pub targets: Option<Vec<String>>,

    /// Seconds between collection runs, 0 runs once
    pub interval: Option<f64>,

    // cgroup sampling
    pub controllers: Option<Vec<String>>,
    #[serde(alias = "read-limit-bytes")]
    pub read_limit_bytes: Option<usize>,

    // ps sampling
    #[serde(alias = "ps-path")]
    pub ps_path: Option<PathBuf>,
    #[serde(alias = "no-value")]
    pub no_value: Option<String>,

    // Logging
    pub log_level: Option<String>,

    // Targets
    #[serde(alias = "elasticsearch-index")]
    pub elasticsearch_index: Option<String>,
    #[serde(alias = "syslog-app-name")]
    pub syslog_app_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: None,
            targets: None,
            interval: Some(DEFAULT_INTERVAL),
            controllers: Some(DEFAULT_CONTROLLERS.iter().map(|c| c.to_string()).collect()),
            read_limit_bytes: Some(crate::sources::cgroup::DEFAULT_READ_LIMIT),
            ps_path: Some(PathBuf::from(DEFAULT_PS_PATH)),
            no_value: Some(DEFAULT_NO_VALUE.into()),
            log_level: Some(DEFAULT_LOG_LEVEL.into()),
            elasticsearch_index: Some(DEFAULT_INDEX_FORMAT.into()),
            syslog_app_name: Some(DEFAULT_APP_NAME.into()),
        }
    }
}

impl Config {
    pub fn interval(&self) -> f64 {
        self.interval.unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn controllers(&self) -> Vec<String> {
        self.controllers
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTROLLERS.iter().map(|c| c.to_string()).collect())
    }

    pub fn read_limit(&self) -> usize {
        self.read_limit_bytes
            .unwrap_or(crate::sources::cgroup::DEFAULT_READ_LIMIT)
    }

    pub fn ps_path(&self) -> PathBuf {
        self.ps_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PS_PATH))
    }

    pub fn no_value(&self) -> &str {
        self.no_value.as_deref().unwrap_or(DEFAULT_NO_VALUE)
    }

    pub fn elasticsearch_index(&self) -> &str {
        self.elasticsearch_index
            .as_deref()
            .unwrap_or(DEFAULT_INDEX_FORMAT)
    }

    pub fn syslog_app_name(&self) -> &str {
        self.syslog_app_name.as_deref().unwrap_or(DEFAULT_APP_NAME)
    }

    pub fn log_level(&self) -> Result<LogLevel, CollectorError> {
        let level = self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
        <LogLevel as ValueEnum>::from_str(level, true)
            .map_err(|_| CollectorError::InvalidConfig(format!("Invalid log_level '{}'", level)))
    }

    pub fn source_specs(&self) -> Result<Vec<SourceSpec>, CollectorError> {
        self.sources
            .iter()
            .flatten()
            .map(|s| s.parse())
            .collect()
    }

    pub fn target_specs(&self) -> Result<Vec<TargetSpec>, CollectorError> {
        self.targets
            .iter()
            .flatten()
            .map(|s| s.parse())
            .collect()
    }
}

/// A parsed `--source` value.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// `cgroupfs[,MOUNT]`
    CgroupFs { mount_point: PathBuf },
    /// `command,CMD ARG...`
    Command { program: String, args: Vec<String> },
    /// `unixps`
    UnixPs,
    /// `linuxps`
    LinuxPs,
}

impl FromStr for SourceSpec {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, options) = match s.split_once(',') {
            Some((kind, options)) => (kind, Some(options)),
            None => (s, None),
        };

        match (kind.trim(), options) {
            ("cgroupfs", options) => Ok(SourceSpec::CgroupFs {
                mount_point: PathBuf::from(options.unwrap_or(DEFAULT_MOUNT_POINT)),
            }),
            ("command", Some(cmdline)) => {
                let mut words = cmdline.split_whitespace().map(String::from);
                let program = words
                    .next()
                    .ok_or_else(|| CollectorError::InvalidSourceSpec(s.to_string()))?;
                Ok(SourceSpec::Command {
                    program,
                    args: words.collect(),
                })
            }
            ("unixps", None) => Ok(SourceSpec::UnixPs),
            ("linuxps", None) => Ok(SourceSpec::LinuxPs),
            _ => Err(CollectorError::InvalidSourceSpec(s.to_string())),
        }
    }
}

impl SourceSpec {
    pub fn build(&self, cfg: &Config, ticks: ClockTicks) -> Box<dyn Source> {
        match self {
            SourceSpec::CgroupFs { mount_point } => {
                let settings = ReadSettings {
                    read_limit: cfg.read_limit(),
                    ticks,
                };
                Box::new(CgroupFilesystem::new(
                    mount_point,
                    &cfg.controllers(),
                    settings,
                ))
            }
            SourceSpec::Command { program, args } => Box::new(CommandSource::new(program, args)),
            SourceSpec::UnixPs => Box::new(
                PsSource::unix(&cfg.ps_path())
                    .with_no_value(cfg.no_value())
                    .with_ticks(ticks),
            ),
            SourceSpec::LinuxPs => Box::new(
                PsSource::linux(&cfg.ps_path())
                    .with_no_value(cfg.no_value())
                    .with_ticks(ticks),
            ),
        }
    }
}

/// A parsed `--target` value.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    /// `console[,stdout|stderr]`
    Console { stderr: bool },
    /// `syslog`
    Syslog,
    /// `netsyslog[,[(tcp|udp)://]HOST:PORT]`
    NetSyslog(SyslogEndpoint),
    /// `elasticsearch[,URL]`, `HOST:PORT` is taken as plain http
    Elasticsearch { url: String },
}

impl FromStr for TargetSpec {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, options) = match s.split_once(',') {
            Some((kind, options)) => (kind, Some(options.trim())),
            None => (s, None),
        };

        match (kind.trim(), options) {
            ("console", None) => Ok(TargetSpec::Console { stderr: false }),
            ("console", Some(stream)) => match stream.to_lowercase().as_str() {
                "stdout" => Ok(TargetSpec::Console { stderr: false }),
                "stderr" => Ok(TargetSpec::Console { stderr: true }),
                _ => Err(CollectorError::InvalidTargetSpec(s.to_string())),
            },
            ("syslog", None) => Ok(TargetSpec::Syslog),
            ("netsyslog", endpoint) => Ok(TargetSpec::NetSyslog(
                endpoint.unwrap_or(DEFAULT_NET_SYSLOG).parse()?,
            )),
            ("elasticsearch", url) => {
                let url = url.unwrap_or(DEFAULT_URL);
                if url.is_empty() {
                    return Err(CollectorError::InvalidTargetSpec(s.to_string()));
                }
                let url = if url.contains("://") {
                    url.to_string()
                } else {
                    format!("http://{}", url)
                };
                Ok(TargetSpec::Elasticsearch { url })
            }
            _ => Err(CollectorError::InvalidTargetSpec(s.to_string())),
        }
    }
}

impl TargetSpec {
    pub fn build(&self, cfg: &Config) -> Result<Box<dyn Target>, CollectorError> {
        Ok(match self {
            TargetSpec::Console { stderr: false } => Box::new(Console::stdout()),
            TargetSpec::Console { stderr: true } => Box::new(Console::stderr()),
            TargetSpec::Syslog => Box::new(Syslog::new(cfg.syslog_app_name())?),
            TargetSpec::NetSyslog(endpoint) => {
                Box::new(NetSyslog::new(endpoint.clone(), cfg.syslog_app_name()))
            }
            TargetSpec::Elasticsearch { url } => {
                Box::new(Elasticsearch::new(url, cfg.elasticsearch_index()))
            }
        })
    }
}

/// Builds the collector described by a validated config. The clock tick
/// rate is read once here and handed to every source that needs it.
pub fn build_collector(cfg: &Config) -> Result<Collector, CollectorError> {
    let ticks = ClockTicks::detect();
    let mut collector = Collector::new();

    for spec in cfg.source_specs()? {
        collector.add_source(spec.build(cfg, ticks));
    }
    for spec in cfg.target_specs()? {
        collector.add_target(spec.build(cfg)?);
    }

    Ok(collector)
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), CollectorError> {
    let sources = cfg.source_specs()?;
    let targets = cfg.target_specs()?;
    if sources.is_empty() || targets.is_empty() {
        return Err(CollectorError::InvalidConfig(
            "No sources or targets given".into(),
        ));
    }

    let interval = cfg.interval();
    if !interval.is_finite() || interval < 0.0 {
        return Err(CollectorError::InvalidConfig(format!(
            "interval must be >= 0, got {}",
            interval
        )));
    }

    if cfg.read_limit() == 0 {
        return Err(CollectorError::InvalidConfig(
            "read_limit_bytes must be greater than 0".into(),
        ));
    }

    if cfg.no_value().is_empty() {
        return Err(CollectorError::InvalidConfig(
            "no_value must not be empty".into(),
        ));
    }

    if StrftimeItems::new(cfg.elasticsearch_index()).any(|item| item == Item::Error) {
        return Err(CollectorError::InvalidConfig(format!(
            "Invalid elasticsearch_index pattern '{}'",
            cfg.elasticsearch_index()
        )));
    }

    cfg.log_level()?;

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Sources and targets given on the CLI replace the configured lists
    if !args.sources.is_empty() {
        config.sources = Some(args.sources.clone());
    }
    if !args.targets.is_empty() {
        config.targets = Some(args.targets.clone());
    }

    if let Some(interval) = args.interval {
        config.interval = Some(interval);
    }
    if let Some(level) = args.log_level {
        config.log_level = level
            .to_possible_value()
            .map(|v| v.get_name().to_string());
    }

    // Parse comma-separated controller list
    if let Some(controllers) = &args.controllers {
        config.controllers = Some(
            controllers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        );
    }

    if let Some(limit) = args.read_limit {
        config.read_limit_bytes = Some(limit);
    }
    if let Some(ps_path) = &args.ps_path {
        config.ps_path = Some(ps_path.clone());
    }
    if let Some(no_value) = &args.no_value {
        config.no_value = Some(no_value.clone());
    }
    if let Some(index) = &args.elasticsearch_index {
        config.elasticsearch_index = Some(index.clone());
    }
    if let Some(app_name) = &args.syslog_app_name {
        config.syslog_app_name = Some(app_name.clone());
    }

    Ok(config)
}

/// Configuration loading with multiple format support. Without an explicit
/// path the default locations are tried; if none exists the defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/cg-stat-collector/config.yaml",
                "/etc/cg-stat-collector/config.yml",
                "/etc/cg-stat-collector/config.json",
                "./cg-stat-collector.yaml",
                "./cg-stat-collector.yml",
                "./cg-stat-collector.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| format!("Cannot read config file {}: {}", path.display(), e))?;

    // File values are layered over the defaults field by field
    let file: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    info!("Loaded configuration from: {}", path.display());

    Ok(merge(Config::default(), file))
}

fn merge(base: Config, file: Config) -> Config {
    Config {
        sources: file.sources.or(base.sources),
        targets: file.targets.or(base.targets),
        interval: file.interval.or(base.interval),
        controllers: file.controllers.or(base.controllers),
        read_limit_bytes: file.read_limit_bytes.or(base.read_limit_bytes),
        ps_path: file.ps_path.or(base.ps_path),
        no_value: file.no_value.or(base.no_value),
        log_level: file.log_level.or(base.log_level),
        elasticsearch_index: file.elasticsearch_index.or(base.elasticsearch_index),
        syslog_app_name: file.syslog_app_name.or(base.syslog_app_name),
    }
}

/// Renders configuration in the requested format
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
