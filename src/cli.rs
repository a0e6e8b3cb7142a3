//! CLI arguments for cg-stat-collector.
//!
//! This module defines the command-line interface using clap. Every option
//! that also exists in the configuration file is optional here, so an unset
//! flag never masks a configured value.

use clap::{Parser, ValueEnum};
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
#[derive(Parser, Debug)]
#[command(
    name = "cg-stat-collector",
    about = "System metric collector for cgroups and the process table",
    long_about = "System metric collector for cgroups and the process table.\n\n\
                  Periodically samples control group hierarchies, ps output or arbitrary \
                  commands, turns successive samples into absolute values, differences and \
                  per-second rates and sends the resulting documents to the console, syslog \
                  or Elasticsearch.",
    version,
    after_help = "Example:\n\n  \
                  Run every minute, collect cgroup and ps data and send it to syslog:\n\n    \
                  cg-stat-collector --interval 60 --source cgroupfs,/sys/fs/cgroup \
                  --source linuxps --target syslog"
)]
pub struct Args {
    /// Add a metric source: cgroupfs[,MOUNT] | command,CMD ARG... | unixps | linuxps
    #[arg(short = 's', long = "source", value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Add a target: console[,stderr] | syslog | netsyslog[,(tcp|udp)://HOST:PORT] | elasticsearch[,URL]
    #[arg(short = 't', long = "target", value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Seconds between collection runs (0 = run once)
    #[arg(short = 'i', long)]
    pub interval: Option<f64>,

    /// Log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// cgroup controllers to walk (comma-separated)
    #[arg(long)]
    pub controllers: Option<String>,

    /// Maximum bytes read from one cgroup parameter file
    #[arg(long)]
    pub read_limit: Option<usize>,

    /// Path to the ps binary
    #[arg(long)]
    pub ps_path: Option<PathBuf>,

    /// Token ps prints for an empty field
    #[arg(long)]
    pub no_value: Option<String>,

    /// Elasticsearch index name, strftime pattern
    #[arg(long)]
    pub elasticsearch_index: Option<String>,

    /// Application name used by the syslog targets
    #[arg(long)]
    pub syslog_app_name: Option<String>,
}
