//! Document sources: cgroup hierarchies, the process table and arbitrary
//! commands.

pub mod cgroup;
pub mod command;
pub mod ps;

pub use cgroup::CgroupFilesystem;
pub use command::CommandSource;
pub use ps::PsSource;
