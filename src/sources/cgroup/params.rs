//! Per-controller parameter tables and the readers that turn cgroup
//! pseudo-files into sample values.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use super::blkio::resolve_device;
use crate::convert::{ClockTicks, Converter};
use crate::diff::{Sample, Value};
use crate::error::CollectorError;

/// Default number of bytes read from one parameter file per cycle.
pub const DEFAULT_READ_LIMIT: usize = 1024;

/// How a parameter file is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reader {
    /// The whole file is one value.
    Single,
    /// `key value` per line.
    KeyValue,
    /// Whitespace separated values, keyed by position (`"0"`, `"1"`, ...).
    EnumeratedArray,
    /// Whitespace separated values as a list.
    Array,
    /// `major:minor key value` per line.
    PerDeviceKeyValue,
    /// `major:minor value` per line.
    PerDeviceValue,
}

/// One attribute of a cgroup entity.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub field: &'static str,
    pub file: &'static str,
    pub reader: Reader,
    pub converter: Converter,
}

const fn param(
    field: &'static str,
    file: &'static str,
    reader: Reader,
    converter: Converter,
) -> Param {
    Param {
        field,
        file,
        reader,
        converter,
    }
}

/// Field that also feeds the entity's PID membership.
pub const TASKS_FIELD: &str = "tasks";

const TASKS: Param = param(TASKS_FIELD, "tasks", Reader::Array, Converter::Integer);

static CPU_ACCOUNT_PARAMS: &[Param] = &[
    TASKS,
    param("usage", "cpuacct.usage", Reader::Single, Converter::Nanosecond),
    param(
        "usage_percpu",
        "cpuacct.usage_percpu",
        Reader::EnumeratedArray,
        Converter::Nanosecond,
    ),
    param("stat", "cpuacct.stat", Reader::KeyValue, Converter::UserHz),
];

static CPU_PARAMS: &[Param] = &[
    TASKS,
    param(
        "cfs_period_us",
        "cpu.cfs_period_us",
        Reader::Single,
        Converter::Microsecond,
    ),
    // shares is not a time; the nanosecond scaling keeps it a float like the other counters
    param("shares", "cpu.shares", Reader::Single, Converter::Nanosecond),
    param("stat", "cpu.stat", Reader::KeyValue, Converter::Nanosecond),
];

static MEMORY_PARAMS: &[Param] = &[
    TASKS,
    param("usage_in_bytes", "memory.usage_in_bytes", Reader::Single, Converter::Integer),
    param(
        "max_usage_in_bytes",
        "memory.max_usage_in_bytes",
        Reader::Single,
        Converter::Integer,
    ),
    param("failcnt", "memory.failcnt", Reader::Single, Converter::Integer),
    param(
        "kmem_usage_in_bytes",
        "memory.kmem.usage_in_bytes",
        Reader::Single,
        Converter::Integer,
    ),
    param(
        "kmem_max_usage_in_bytes",
        "memory.kmem.max_usage_in_bytes",
        Reader::Single,
        Converter::Integer,
    ),
    param("kmem_failcnt", "memory.kmem.failcnt", Reader::Single, Converter::Integer),
    param(
        "memsw_usage_in_bytes",
        "memory.memsw.usage_in_bytes",
        Reader::Single,
        Converter::Integer,
    ),
    param(
        "memsw_max_usage_in_bytes",
        "memory.memsw.max_usage_in_bytes",
        Reader::Single,
        Converter::Integer,
    ),
    param("memsw_failcnt", "memory.memsw.failcnt", Reader::Single, Converter::Integer),
    param("stat", "memory.stat", Reader::KeyValue, Converter::Integer),
];

static BLKIO_PARAMS: &[Param] = &[
    TASKS,
    param("io_serviced", "blkio.io_serviced", Reader::PerDeviceKeyValue, Converter::Integer),
    param(
        "io_serviced_recursive",
        "blkio.io_serviced_recursive",
        Reader::PerDeviceKeyValue,
        Converter::Integer,
    ),
    param(
        "io_service_bytes",
        "blkio.io_service_bytes",
        Reader::PerDeviceKeyValue,
        Converter::Integer,
    ),
    param(
        "io_service_bytes_recursive",
        "blkio.io_service_bytes_recursive",
        Reader::PerDeviceKeyValue,
        Converter::Integer,
    ),
    param(
        "io_service_time",
        "blkio.io_service_time",
        Reader::PerDeviceKeyValue,
        Converter::Nanosecond,
    ),
    param(
        "io_service_time_recursive",
        "blkio.io_service_time_recursive",
        Reader::PerDeviceKeyValue,
        Converter::Nanosecond,
    ),
    param("io_merged", "blkio.io_merged", Reader::PerDeviceKeyValue, Converter::Integer),
    param(
        "io_merged_recursive",
        "blkio.io_merged_recursive",
        Reader::PerDeviceKeyValue,
        Converter::Integer,
    ),
    param(
        "io_wait_time",
        "blkio.io_wait_time",
        Reader::PerDeviceKeyValue,
        Converter::Nanosecond,
    ),
    param(
        "io_wait_time_recursive",
        "blkio.io_wait_time_recursive",
        Reader::PerDeviceKeyValue,
        Converter::Nanosecond,
    ),
    param("io_queued", "blkio.io_queued", Reader::PerDeviceKeyValue, Converter::Integer),
    param(
        "io_queued_recursive",
        "blkio.io_queued_recursive",
        Reader::PerDeviceKeyValue,
        Converter::Integer,
    ),
    param("time", "blkio.time", Reader::PerDeviceValue, Converter::Millisecond),
    param(
        "time_recursive",
        "blkio.time_recursive",
        Reader::PerDeviceValue,
        Converter::Millisecond,
    ),
    param(
        "throttle_io_service_bytes",
        "blkio.throttle.io_service_bytes",
        Reader::PerDeviceKeyValue,
        Converter::Integer,
    ),
    param(
        "throttle_io_serviced",
        "blkio.throttle.io_serviced",
        Reader::PerDeviceKeyValue,
        Converter::Integer,
    ),
];

/// The cgroup entity types, selected once per discovered directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupKind {
    Cpu,
    CpuAccount,
    Memory,
    Blkio,
}

impl CgroupKind {
    /// Maps a controller directory name to its entity type.
    pub fn from_controller(controller: &str) -> Option<Self> {
        match controller {
            "cpu" => Some(Self::Cpu),
            "cpuacct" => Some(Self::CpuAccount),
            "memory" => Some(Self::Memory),
            "blkio" => Some(Self::Blkio),
            _ => None,
        }
    }

    /// Document type, also the key the diffed metrics live under.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::CpuAccount => "CPUAccount",
            Self::Memory => "Memory",
            Self::Blkio => "Blkio",
        }
    }

    pub fn params(self) -> &'static [Param] {
        match self {
            Self::Cpu => CPU_PARAMS,
            Self::CpuAccount => CPU_ACCOUNT_PARAMS,
            Self::Memory => MEMORY_PARAMS,
            Self::Blkio => BLKIO_PARAMS,
        }
    }
}

/// Settings shared by every parameter read.
#[derive(Debug, Clone, Copy)]
pub struct ReadSettings {
    pub read_limit: usize,
    pub ticks: ClockTicks,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            read_limit: DEFAULT_READ_LIMIT,
            ticks: ClockTicks::detect(),
        }
    }
}

/// Rejects parameter names that could leave the cgroup directory.
pub fn check_param_name(file: &str) -> Result<(), CollectorError> {
    if file.contains('/') {
        return Err(CollectorError::BadParameterName(file.to_string()));
    }
    Ok(())
}

/// Reads up to `limit` bytes of `<dir>/<file>`.
///
/// `Ok(None)` means the file is missing or unreadable; `Ok(Some(""))` means
/// it exists but is empty. Longer files are truncated.
pub fn read_raw(dir: &Path, file: &str, limit: usize) -> Result<Option<String>, CollectorError> {
    check_param_name(file)?;

    let path = dir.join(file);
    let f = match File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            debug!("Skipping {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    let mut buf = Vec::with_capacity(limit.min(4096));
    if let Err(e) = f.take(limit as u64).read_to_end(&mut buf) {
        debug!("Failed to read {}: {}", path.display(), e);
        return Ok(None);
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Reads one parameter and converts it. `Ok(None)` leaves the field out of
/// this cycle's sample.
pub fn read_param(
    dir: &Path,
    p: &Param,
    settings: &ReadSettings,
) -> Result<Option<Value>, CollectorError> {
    let content = match read_raw(dir, p.file, settings.read_limit)? {
        Some(c) => c,
        None => return Ok(None),
    };

    if content.is_empty() {
        if p.reader == Reader::PerDeviceKeyValue {
            return Err(CollectorError::EmptyDeviceParameter {
                param: p.file.to_string(),
                path: dir.join(p.file),
            });
        }
        return Ok(None);
    }

    let ticks = settings.ticks;
    let value = match p.reader {
        Reader::Single => p.converter.convert(&content, ticks),
        Reader::KeyValue => non_empty_map(parse_key_value(&content, p.converter, ticks)),
        Reader::EnumeratedArray => {
            non_empty_map(parse_enumerated_array(&content, p.converter, ticks))
        }
        Reader::Array => {
            let items = parse_array(&content, p.converter, ticks);
            (!items.is_empty()).then_some(Value::List(items))
        }
        Reader::PerDeviceKeyValue => {
            non_empty_map(parse_per_device_key_value(&content, p.converter, ticks))
        }
        Reader::PerDeviceValue => {
            non_empty_map(parse_per_device_value(&content, p.converter, ticks))
        }
    };

    Ok(value)
}

fn non_empty_map(map: Sample) -> Option<Value> {
    (!map.is_empty()).then_some(Value::Map(map))
}

/// Parses `key value` lines; anything else is skipped.
pub fn parse_key_value(content: &str, conv: Converter, ticks: ClockTicks) -> Sample {
    let mut out = Sample::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 {
            continue;
        }
        if let Some(v) = conv.convert(parts[1], ticks) {
            out.insert(parts[0].to_string(), v);
        }
    }
    out
}

pub fn parse_enumerated_array(content: &str, conv: Converter, ticks: ClockTicks) -> Sample {
    content
        .split_whitespace()
        .enumerate()
        .filter_map(|(i, token)| conv.convert(token, ticks).map(|v| (i.to_string(), v)))
        .collect()
}

pub fn parse_array(content: &str, conv: Converter, ticks: ClockTicks) -> Vec<Value> {
    content
        .split_whitespace()
        .filter_map(|token| conv.convert(token, ticks))
        .collect()
}

/// Parses `major:minor key value` lines into `device -> key -> value`.
/// Lines with a different token count (such as the trailing `Total N`) are skipped.
pub fn parse_per_device_key_value(content: &str, conv: Converter, ticks: ClockTicks) -> Sample {
    let mut out = Sample::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            continue;
        }
        let Some(v) = conv.convert(parts[2], ticks) else {
            continue;
        };

        let entry = out
            .entry(resolve_device(parts[0]))
            .or_insert_with(|| Value::Map(Sample::new()));
        if let Value::Map(stats) = entry {
            stats.insert(parts[1].to_string(), v);
        }
    }
    out
}

/// Parses `major:minor value` lines into `device -> value`.
pub fn parse_per_device_value(content: &str, conv: Converter, ticks: ClockTicks) -> Sample {
    let mut out = Sample::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 {
            continue;
        }
        if let Some(v) = conv.convert(parts[1], ticks) {
            out.insert(resolve_device(parts[0]), v);
        }
    }
    out
}
