//! Document sinks.

pub mod console;
pub mod elastic;
pub mod syslog;

pub use console::Console;
pub use elastic::Elasticsearch;
pub use syslog::{NetSyslog, Syslog, SyslogEndpoint};
