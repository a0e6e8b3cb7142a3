//! cg-stat-collector library
//!
//! Samples Linux resource accounting interfaces (cgroup v1 hierarchies and
//! the process table) and turns successive samples into metric documents
//! with absolute values, differences and per-second rates.
//!
//! # Layout
//!
//! - [`convert`]: unit converters for raw tokens
//! - [`diff`]: the sample model and the differential aggregator
//! - [`document`]: documents and timestamp bookkeeping
//! - [`collector`]: the `Source` / `Target` traits and the fan-out
//! - [`sources`]: cgroup, `ps` and command sources
//! - [`targets`]: console, syslog and Elasticsearch sinks
//!
//! # Usage
//!
//! ```no_run
//! use cg_stat_collector::collector::Collector;
//! use cg_stat_collector::sources::cgroup::{CgroupFilesystem, ReadSettings, DEFAULT_CONTROLLERS};
//! use cg_stat_collector::targets::Console;
//! use std::path::Path;
//!
//! let controllers: Vec<String> = DEFAULT_CONTROLLERS.iter().map(|c| c.to_string()).collect();
//!
//! let mut collector = Collector::new();
//! collector.add_source(Box::new(CgroupFilesystem::new(
//!     Path::new("/sys/fs/cgroup"),
//!     &controllers,
//!     ReadSettings::default(),
//! )));
//! collector.add_target(Box::new(Console::stdout()));
//!
//! let report = collector.collect();
//! println!("{} documents, {} failures", report.documents, report.failures.len());
//! ```

pub mod cli;
pub mod collector;
pub mod config;
pub mod convert;
pub mod diff;
pub mod document;
pub mod error;
pub mod sources;
pub mod startup_checks;
pub mod targets;

// Re-export main types for convenience
pub use collector::{CollectReport, Collector, Source, SourceFailure, Target};
pub use diff::{diff, MetricValue, Number, Sample, Value};
pub use document::Document;
pub use error::CollectorError;
