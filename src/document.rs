//! Output documents and per-source timestamp bookkeeping.

use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use sha2::{Digest, Sha256};

/// One unit of output: the diffed metrics of one entity (or device) plus context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub source: String,
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub data: Map<String, JsonValue>,
}

impl Document {
    /// Creates a document whose id is derived from its content.
    pub fn new(source: &str, doc_type: &str, data: Map<String, JsonValue>) -> Self {
        let id = content_id(source, doc_type, &data);
        Self {
            source: source.to_string(),
            id,
            doc_type: doc_type.to_string(),
            data,
        }
    }

    /// Creates a document with a caller-supplied id.
    pub fn with_id(source: &str, id: &str, doc_type: &str, data: Map<String, JsonValue>) -> Self {
        Self {
            source: source.to_string(),
            id: id.to_string(),
            doc_type: doc_type.to_string(),
            data,
        }
    }

    /// Flattened `{...data, id, type}` form used by the text sinks.
    pub fn render(&self) -> JsonValue {
        let mut out = self.data.clone();
        out.insert("id".into(), JsonValue::String(self.id.clone()));
        out.insert("type".into(), JsonValue::String(self.doc_type.clone()));
        JsonValue::Object(out)
    }
}

/// Hex SHA-256 over source, type and the serialized payload.
///
/// Two documents with the same source, type and payload share an id.
pub fn content_id(source: &str, doc_type: &str, data: &Map<String, JsonValue>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(doc_type.as_bytes());
    hasher.update([0u8]);
    // serde_json maps are ordered, so serialization is deterministic
    hasher.update(JsonValue::Object(data.clone()).to_string().as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Current and previous sampling time of one source or entity.
#[derive(Debug, Clone, Default)]
pub struct SampleClock {
    current: Option<DateTime<Utc>>,
    previous: Option<DateTime<Utc>>,
}

impl SampleClock {
    /// Shifts current to previous and records `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.previous = self.current.replace(now);
    }

    pub fn current(&self) -> Option<DateTime<Utc>> {
        self.current
    }

    /// Seconds between the last two ticks, `0.0` until two ticks happened.
    pub fn elapsed_seconds(&self) -> f64 {
        match (self.current, self.previous) {
            (Some(current), Some(previous)) => {
                (current - previous).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0
            }
            _ => 0.0,
        }
    }
}

/// Host name of this machine, `localhost` if it cannot be determined.
pub fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Context attached to every document: host and the sampling time broken
/// into calendar components plus ISO-8601 in UTC and local time.
pub fn base_information(host: &str, ts: DateTime<Utc>) -> Map<String, JsonValue> {
    let local = ts.with_timezone(&Local);

    let mut base = Map::new();
    base.insert("host".into(), JsonValue::String(host.to_string()));
    base.insert(
        "timestamp".into(),
        json!({
            "year": local.year(),
            "month": local.month(),
            "day": local.day(),
            "hour": local.hour(),
            "minute": local.minute(),
            "second": local.second(),
            "microsecond": local.timestamp_subsec_micros(),
            "weekday": local.weekday().num_days_from_monday(),
            "utc": ts.to_rfc3339(),
            "local": local.to_rfc3339(),
        }),
    );
    base
}
