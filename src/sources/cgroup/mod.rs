//! Control group (v1) source.
//!
//! This module provides:
//! - `params`: per-controller parameter tables and pseudo-file readers
//! - `blkio`: device naming and per-device regrouping for block I/O
//!
//! [`CgroupFilesystem`] walks every configured controller below the mount
//! point, keeps one [`CGroup`] per discovered directory and turns their
//! samples into documents.

pub mod blkio;
pub mod params;

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::collector::Source;
use crate::diff::{diff, MetricValue, Sample, Value};
use crate::document::{base_information, hostname, Document, SampleClock};
use crate::error::CollectorError;

pub use params::{CgroupKind, Param, ReadSettings, Reader, DEFAULT_READ_LIMIT, TASKS_FIELD};

/// Default cgroup v1 mount point.
pub const DEFAULT_MOUNT_POINT: &str = "/sys/fs/cgroup";

/// Controllers walked when none are configured.
pub const DEFAULT_CONTROLLERS: &[&str] = &["blkio", "cpu", "cpuacct", "memory"];

/// One cgroup directory below one controller, with its sampling history.
#[derive(Debug)]
pub struct CGroup {
    name: String,
    kind: CgroupKind,
    path: PathBuf,
    clock: SampleClock,
    data: Sample,
    last_data: Sample,
    pids: Vec<String>,
}

impl CGroup {
    pub fn new(name: &str, kind: CgroupKind, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            kind,
            path: path.to_path_buf(),
            clock: SampleClock::default(),
            data: Sample::new(),
            last_data: Sample::new(),
            pids: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CgroupKind {
        self.kind
    }

    /// Task membership from the last update, verbatim.
    pub fn pids(&self) -> &[String] {
        &self.pids
    }

    /// Reads every parameter of this cgroup's type into a fresh sample.
    ///
    /// Missing or empty files leave their field out. Fails on unsafe
    /// parameter names and on empty device-keyed files, in which case the
    /// previous sample and timestamps are left untouched.
    pub fn update_at(
        &mut self,
        now: DateTime<Utc>,
        settings: &ReadSettings,
    ) -> Result<(), CollectorError> {
        let mut data = Sample::new();
        for p in self.kind.params() {
            if let Some(value) = params::read_param(&self.path, p, settings)? {
                data.insert(p.field.to_string(), value);
            }
        }

        self.clock.tick(now);
        self.pids = match data.get(TASKS_FIELD) {
            Some(Value::List(tasks)) => tasks.iter().filter_map(pid_string).collect(),
            _ => Vec::new(),
        };
        self.last_data = std::mem::replace(&mut self.data, data);
        Ok(())
    }

    fn build_data(&self) -> Vec<BTreeMap<String, MetricValue>> {
        let elapsed = self.clock.elapsed_seconds();
        match self.kind {
            CgroupKind::Blkio => blkio::device_diffs(&self.data, &self.last_data, elapsed)
                .into_iter()
                .map(|(_, metrics)| metrics)
                .collect(),
            _ => vec![diff(&self.data, &self.last_data, elapsed)],
        }
    }

    /// Documents for the last update; one per device for block I/O.
    pub fn docs(&self, host: &str) -> Vec<Document> {
        let Some(ts) = self.clock.current() else {
            return Vec::new();
        };

        let mut base = base_information(host, ts);
        base.insert("name".into(), JsonValue::String(self.name.clone()));
        base.insert(
            "path".into(),
            JsonValue::String(self.path.to_string_lossy().into_owned()),
        );
        base.insert(
            "pids".into(),
            JsonValue::Array(self.pids.iter().cloned().map(JsonValue::String).collect()),
        );

        let type_name = self.kind.type_name();
        self.build_data()
            .into_iter()
            .map(|metrics| {
                let mut data: Map<String, JsonValue> = base.clone();
                data.insert(
                    type_name.to_string(),
                    serde_json::to_value(&metrics).unwrap_or_default(),
                );
                Document::new(&self.name, type_name, data)
            })
            .collect()
    }
}

fn pid_string(v: &Value) -> Option<String> {
    match v {
        Value::Integer(pid) => Some(pid.to_string()),
        Value::Text(pid) => Some(pid.clone()),
        _ => None,
    }
}

/// Source over a cgroup v1 mount point.
pub struct CgroupFilesystem {
    name: String,
    mount_point: PathBuf,
    controllers: Vec<String>,
    groups: HashMap<String, BTreeMap<String, CGroup>>,
    settings: ReadSettings,
    host: String,
}

impl CgroupFilesystem {
    /// Repeated controller names are kept once, in first-seen order.
    pub fn new(mount_point: &Path, controllers: &[String], settings: ReadSettings) -> Self {
        let mut unique = Vec::with_capacity(controllers.len());
        for c in controllers {
            if !unique.contains(c) {
                unique.push(c.clone());
            }
        }

        Self {
            name: "CGroupFilesystem".to_string(),
            mount_point: mount_point.to_path_buf(),
            controllers: unique,
            groups: HashMap::new(),
            settings,
            host: hostname(),
        }
    }

    /// Overrides the host name reported in documents.
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Lists `(name, path)` of every directory below one controller. The
    /// controller root is named `/`. An unreadable controller yields nothing.
    pub fn enumerate_groups(&self, controller: &str) -> Vec<(String, PathBuf)> {
        let search_path = self.mount_point.join(controller);
        let mut out = Vec::new();

        for entry in WalkDir::new(&search_path).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping part of {}: {}", search_path.display(), e);
                    continue;
                }
            };
            // A symlinked controller root reports the link's own type.
            let is_dir = entry.file_type().is_dir()
                || (entry.depth() == 0 && entry.path().is_dir());
            if !is_dir {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&search_path)
                .unwrap_or_else(|_| Path::new(""));
            let name = format!("/{}", rel.to_string_lossy());
            out.push((name, entry.path().to_path_buf()));
        }

        out
    }

    /// Discovers cgroups and updates each of them. Cgroups that are no
    /// longer present are evicted.
    #[instrument(skip(self), fields(mount_point = %self.mount_point.display()))]
    pub fn update_at(&mut self, now: DateTime<Utc>) -> Result<(), CollectorError> {
        for controller in self.controllers.clone() {
            let Some(kind) = CgroupKind::from_controller(&controller) else {
                debug!("Unsupported controller {}, skipping", controller);
                continue;
            };

            let found = self.enumerate_groups(&controller);
            let seen: HashSet<&str> = found.iter().map(|(name, _)| name.as_str()).collect();

            let groups = self.groups.entry(controller.clone()).or_default();
            groups.retain(|name, _| {
                let keep = seen.contains(name.as_str());
                if !keep {
                    debug!("Evicting vanished cgroup {}:{}", controller, name);
                }
                keep
            });

            for (name, path) in &found {
                let group = groups
                    .entry(name.clone())
                    .or_insert_with(|| CGroup::new(name, kind, path));
                group.update_at(now, &self.settings)?;
            }
        }
        Ok(())
    }

    /// Updates at `now` and returns every cgroup's documents in controller order.
    pub fn docs_at(&mut self, now: DateTime<Utc>) -> Result<Vec<Document>, CollectorError> {
        self.update_at(now)?;

        let mut docs = Vec::new();
        for controller in &self.controllers {
            if let Some(groups) = self.groups.get(controller) {
                for group in groups.values() {
                    docs.extend(group.docs(&self.host));
                }
            }
        }
        Ok(docs)
    }
}

impl Source for CgroupFilesystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn docs(&mut self) -> Result<Vec<Document>, CollectorError> {
        self.docs_at(Utc::now())
    }
}
