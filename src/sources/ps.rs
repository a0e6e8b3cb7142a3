//! Process table sampling through `ps`.
//!
//! `ps -axo <fields>` is run once per cycle. Every output line becomes one
//! per-PID [`Sample`], which is diffed against the same PID's sample from
//! the previous cycle. PIDs that disappeared are dropped without a trace.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::debug;

use super::command;
use crate::collector::Source;
use crate::convert::{ClockTicks, Converter};
use crate::diff::{diff, Sample, Value};
use crate::document::{base_information, hostname, Document, SampleClock};
use crate::error::CollectorError;

/// Default `ps` binary.
pub const DEFAULT_PS_PATH: &str = "/bin/ps";

/// Default "no value" token printed by `ps`.
pub const DEFAULT_NO_VALUE: &str = "-";

const UNIX_FIELDS: &[&str] = &[
    "pid", "ppid", "pgid", "pcpu", "ruser", "user", "rgroup", "group", "time", "etime", "vsz",
    "nice", "tty", "comm", "args",
];

const UNIX_CONVERTERS: &[(&str, Converter)] = &[
    ("pcpu", Converter::Float),
    ("vsz", Converter::Kilobyte),
    ("nice", Converter::Integer),
    ("time", Converter::ElapsedTime),
    ("etime", Converter::ElapsedTime),
];

const LINUX_FIELDS: &[&str] = &[
    "pid", "ppid", "pgid", "pcpu", "ruser", "user", "rgroup", "group", "time", "etime", "vsz",
    "nice", "tty", "euid", "egid", "ruid", "rgid", "fuid", "fuser", "fgid", "fgroup", "suid",
    "sgid", "pending", "class", "rss", "drs", "trs", "size", "eip", "esp", "stackp", "mntns",
    "netns", "pidns", "ipcns", "label", "maj_flt", "min_flt", "nlwp", "psr", "rtprio", "sched",
    "state", "comm", "pmem", "command",
];

const LINUX_CONVERTERS: &[(&str, Converter)] = &[
    ("pmem", Converter::Float),
    ("egid", Converter::Integer),
    ("euid", Converter::Integer),
    ("sgid", Converter::Integer),
    ("suid", Converter::Integer),
    ("fgid", Converter::Integer),
    ("fuid", Converter::Integer),
    ("mntns", Converter::Integer),
    ("netns", Converter::Integer),
    ("ipcns", Converter::Integer),
    ("pidns", Converter::Integer),
    ("min_flt", Converter::Integer),
    ("maj_flt", Converter::Integer),
    ("nlwp", Converter::Integer),
    ("psr", Converter::Integer),
    ("rtprio", Converter::Integer),
    ("rss", Converter::Kilobyte),
    ("size", Converter::Kilobyte),
    ("drs", Converter::Kilobyte),
    ("trs", Converter::Kilobyte),
];

/// How to turn `ps` output into per-PID samples.
#[derive(Debug, Clone)]
pub struct PsLayout {
    pub fields: Vec<String>,
    pub converters: HashMap<String, Converter>,
    pub no_value: String,
    pub ticks: ClockTicks,
}

impl PsLayout {
    pub fn new(fields: &[&str], converters: &[(&str, Converter)]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            converters: converters
                .iter()
                .map(|(name, conv)| (name.to_string(), *conv))
                .collect(),
            no_value: DEFAULT_NO_VALUE.to_string(),
            ticks: ClockTicks::detect(),
        }
    }

    /// Portable field set.
    pub fn unix() -> Self {
        Self::new(UNIX_FIELDS, UNIX_CONVERTERS)
    }

    /// Linux field set, layered on the portable converters.
    pub fn linux() -> Self {
        let mut layout = Self::new(LINUX_FIELDS, UNIX_CONVERTERS);
        for (name, conv) in LINUX_CONVERTERS {
            layout.converters.insert(name.to_string(), *conv);
        }
        layout
    }

    /// The `-o` argument for `ps`.
    pub fn format_arg(&self) -> String {
        self.fields.join(",")
    }

    /// Parses `ps` output into `(pid, sample)` pairs in output order.
    ///
    /// The first line is a header. Whitespace runs are collapsed and every
    /// line is split into at most `fields.len()` tokens, so the last field
    /// keeps any embedded spaces. Lines without a `pid` field are skipped.
    pub fn parse(&self, output: &str) -> Vec<(String, Sample)> {
        let mut out = Vec::new();

        for line in output.lines().skip(1) {
            let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed.is_empty() {
                continue;
            }

            let mut sample = Sample::new();
            let mut pid = None;
            for (field, token) in self.fields.iter().zip(collapsed.splitn(self.fields.len(), ' ')) {
                let field = field.to_lowercase();

                if field == "pid" {
                    pid = Some(token.to_string());
                    sample.insert(field, Value::Text(token.to_string()));
                    continue;
                }
                if token == self.no_value {
                    continue;
                }

                match self.converters.get(&field) {
                    Some(conv) => {
                        if let Some(v) = conv.convert(token, self.ticks) {
                            sample.insert(field, v);
                        }
                    }
                    None => {
                        sample.insert(field, Value::Text(token.to_string()));
                    }
                }
            }

            match pid {
                Some(pid) => out.push((pid, sample)),
                None => debug!("Skipping ps line without pid: {}", line),
            }
        }

        out
    }
}

/// Source over the process table.
pub struct PsSource {
    name: String,
    ps_path: String,
    layout: PsLayout,
    clock: SampleClock,
    pids: Vec<(String, Sample)>,
    last_pids: HashMap<String, Sample>,
    host: String,
}

impl PsSource {
    pub fn new(name: &str, ps_path: &Path, layout: PsLayout) -> Self {
        Self {
            name: name.to_string(),
            ps_path: ps_path.to_string_lossy().into_owned(),
            layout,
            clock: SampleClock::default(),
            pids: Vec::new(),
            last_pids: HashMap::new(),
            host: hostname(),
        }
    }

    /// `UnixPS` preset.
    pub fn unix(ps_path: &Path) -> Self {
        Self::new("UnixPS", ps_path, PsLayout::unix())
    }

    /// `LinuxPS` preset.
    pub fn linux(ps_path: &Path) -> Self {
        Self::new("LinuxPS", ps_path, PsLayout::linux())
    }

    pub fn with_no_value(mut self, no_value: &str) -> Self {
        self.layout.no_value = no_value.to_string();
        self
    }

    pub fn with_ticks(mut self, ticks: ClockTicks) -> Self {
        self.layout.ticks = ticks;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn update_at(&mut self, now: DateTime<Utc>) -> Result<(), CollectorError> {
        self.clock.tick(now);

        let args = vec!["-axo".to_string(), self.layout.format_arg()];
        let out = command::run(&self.ps_path, &args)?;
        let pids = self.layout.parse(&out.stdout);
        debug!("{} sampled {} processes", self.name, pids.len());

        self.last_pids = std::mem::replace(&mut self.pids, pids).into_iter().collect();
        Ok(())
    }

    pub fn docs_at(&mut self, now: DateTime<Utc>) -> Result<Vec<Document>, CollectorError> {
        self.update_at(now)?;

        let base = base_information(&self.host, now);
        let elapsed = self.clock.elapsed_seconds();
        let empty = Sample::new();

        let docs = self
            .pids
            .iter()
            .map(|(pid, sample)| {
                let previous = self.last_pids.get(pid).unwrap_or(&empty);
                let mut metrics = serde_json::to_value(diff(sample, previous, elapsed))
                    .unwrap_or_default();
                if let JsonValue::Object(map) = &mut metrics {
                    map.insert("pid".into(), JsonValue::String(pid.clone()));
                }

                let mut data = base.clone();
                data.insert(self.name.clone(), metrics);
                data.insert(
                    "pids".into(),
                    JsonValue::Array(vec![JsonValue::String(pid.clone())]),
                );
                Document::new(&self.name, &self.name, data)
            })
            .collect();

        Ok(docs)
    }
}

impl Source for PsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn docs(&mut self) -> Result<Vec<Document>, CollectorError> {
        self.docs_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> PsLayout {
        let mut l = PsLayout::unix();
        l.ticks = ClockTicks::new(100.0);
        l
    }

    const OUTPUT: &str = "\
  PID  PPID  PGID %CPU RUSER    USER     RGROUP   GROUP        TIME     ELAPSED    VSZ  NI TT       COMMAND         COMMAND
    1     0     1  0.1 root     root     root     root     00:00:05  1-02:03:04 168000   0 ?        systemd         /sbin/init splash
  842     1   842  2.5 www      www      www      www      01:02:03       05:06   4096   - pts/0    nginx           nginx: worker  process
";

    // -------------------------------------------------------------------------
    // Output parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_converts_fields() {
        let rows = layout().parse(OUTPUT);
        assert_eq!(rows.len(), 2);

        let (pid, init) = &rows[0];
        assert_eq!(pid, "1");
        assert_eq!(init["pid"], Value::Text("1".into()));
        assert_eq!(init["pcpu"], Value::Float(0.1));
        assert_eq!(init["time"], Value::Integer(5));
        assert_eq!(init["etime"], Value::Integer(93784));
        assert_eq!(init["vsz"], Value::Integer(168000 * 1024));
        assert_eq!(init["nice"], Value::Integer(0));
        assert_eq!(init["user"], Value::Text("root".into()));
        assert_eq!(init["args"], Value::Text("/sbin/init splash".into()));
    }

    #[test]
    fn test_parse_skips_placeholder_and_collapses_last_field() {
        let rows = layout().parse(OUTPUT);
        let (pid, nginx) = &rows[1];

        assert_eq!(pid, "842");
        assert!(!nginx.contains_key("nice"));
        assert_eq!(nginx["etime"], Value::Integer(306));
        assert_eq!(nginx["time"], Value::Integer(3723));
        assert_eq!(nginx["args"], Value::Text("nginx: worker process".into()));
    }

    #[test]
    fn test_parse_header_only_and_blank_lines() {
        assert!(layout().parse("  PID\n").is_empty());
        assert!(layout().parse("").is_empty());
        assert_eq!(layout().parse("PID PPID\n\n   \n 7 1\n").len(), 1);
    }

    #[test]
    fn test_custom_placeholder() {
        let mut l = layout();
        l.no_value = "n/a".into();
        let rows = l.parse("H\n 9 1 1 n/a\n");
        assert!(!rows[0].1.contains_key("pcpu"));
        assert_eq!(rows[0].1["ppid"], Value::Text("1".into()));
    }

    // -------------------------------------------------------------------------
    // Presets
    // -------------------------------------------------------------------------

    #[test]
    fn test_linux_preset_extends_unix() {
        let l = PsLayout::linux();
        assert_eq!(l.fields.len(), 47);
        assert_eq!(l.fields.last().map(String::as_str), Some("command"));
        assert_eq!(l.converters.get("vsz"), Some(&Converter::Kilobyte));
        assert_eq!(l.converters.get("rss"), Some(&Converter::Kilobyte));
        assert_eq!(l.converters.get("mntns"), Some(&Converter::Integer));
        assert_eq!(l.converters.get("pmem"), Some(&Converter::Float));
    }

    #[test]
    fn test_format_arg() {
        assert!(PsLayout::unix().format_arg().starts_with("pid,ppid,pgid,pcpu,"));
        assert!(PsLayout::unix().format_arg().ends_with(",comm,args"));
    }

    #[test]
    fn test_missing_ps_binary_is_an_error() {
        let mut src = PsSource::unix(Path::new("/nonexistent/ps"));
        assert!(matches!(
            src.docs_at(Utc::now()),
            Err(CollectorError::CommandSpawn { .. })
        ));
    }
}
