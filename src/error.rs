//! Error types for the collector library.
//!
//! Only conditions that must reach the caller live here. Missing parameter
//! files, unparsable tokens and malformed lines are recovered where they are
//! detected and never become a `CollectorError`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// A parameter file name contained a path separator.
    #[error("Only plain parameter file names allowed: {0}")]
    BadParameterName(String),

    /// A device-keyed parameter file exists but returned no data at all.
    #[error("Device parameter {param} returned no data: {path}")]
    EmptyDeviceParameter { param: String, path: PathBuf },

    #[error("Failed to spawn {command}: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read output of {command}: {source}")]
    CommandIo {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid source '{0}'")]
    InvalidSourceSpec(String),

    #[error("Invalid target '{0}'")]
    InvalidTargetSpec(String),

    #[error("Configuration invalid: {0}")]
    InvalidConfig(String),
}
