//! Sample model and the differential aggregator.
//!
//! A [`Sample`] is what one entity looked like during one collection cycle.
//! [`diff`] reconciles the current sample with the one taken a cycle earlier
//! and turns every numeric field into an absolute value, a difference and a
//! per-second rate, and every list into its items plus what was added and
//! removed since the last cycle.

use serde::Serialize;
use std::collections::BTreeMap;

/// Converted attribute values of one entity, keyed by field name.
pub type Sample = BTreeMap<String, Value>;

/// A single converted field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(Sample),
}

impl Value {
    fn as_number(&self) -> Option<Number> {
        match self {
            Value::Integer(v) => Some(Number::Integer(*v)),
            Value::Float(v) => Some(Number::Float(*v)),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Numeric payload of a scalar metric. Integers stay integers as long as
/// both sides of a subtraction are integers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    fn minus(self, other: Number) -> Number {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => match a.checked_sub(b) {
                Some(d) => Number::Integer(d),
                None => Number::Float(a as f64 - b as f64),
            },
            (a, b) => Number::Float(a.as_f64() - b.as_f64()),
        }
    }
}

/// Output of [`diff`] for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar {
        absolute: Number,
        #[serde(skip_serializing_if = "Option::is_none")]
        difference: Option<Number>,
        #[serde(skip_serializing_if = "Option::is_none")]
        difference_per_second: Option<f64>,
    },
    SetValued {
        items: Vec<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        added: Option<Vec<Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        removed: Option<Vec<Value>>,
    },
    Nested(BTreeMap<String, MetricValue>),
    Opaque(Value),
}

impl MetricValue {
    /// Child of a nested value.
    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        match self {
            MetricValue::Nested(map) => map.get(key),
            _ => None,
        }
    }
}

/// Diffs `new` against `old`, key by key over `new`.
///
/// Keys that only exist in `old` are dropped. `old` may be empty, which is
/// the first-sample case: scalars then carry `absolute` only and lists carry
/// `items` only. `elapsed_seconds` of zero suppresses per-second rates.
pub fn diff(new: &Sample, old: &Sample, elapsed_seconds: f64) -> BTreeMap<String, MetricValue> {
    new.iter()
        .map(|(key, value)| {
            (
                key.clone(),
                diff_value(value, old.get(key), elapsed_seconds),
            )
        })
        .collect()
}

fn diff_value(new: &Value, old: Option<&Value>, elapsed_seconds: f64) -> MetricValue {
    match new {
        Value::Map(map) => {
            let empty = Sample::new();
            let previous = match old {
                Some(Value::Map(previous)) => previous,
                _ => &empty,
            };
            MetricValue::Nested(diff(map, previous, elapsed_seconds))
        }
        Value::List(items) => {
            let (added, removed) = match old {
                Some(previous) => {
                    let previous: &[Value] = match previous {
                        Value::List(p) => p,
                        _ => &[],
                    };
                    let added = items
                        .iter()
                        .filter(|v| !previous.contains(v))
                        .cloned()
                        .collect();
                    let removed = previous
                        .iter()
                        .filter(|v| !items.contains(v))
                        .cloned()
                        .collect();
                    (Some(added), Some(removed))
                }
                None => (None, None),
            };
            MetricValue::SetValued {
                items: items.clone(),
                added,
                removed,
            }
        }
        Value::Text(_) => MetricValue::Opaque(new.clone()),
        Value::Integer(v) => scalar(Number::Integer(*v), old, elapsed_seconds),
        Value::Float(v) => scalar(Number::Float(*v), old, elapsed_seconds),
    }
}

fn scalar(absolute: Number, old: Option<&Value>, elapsed_seconds: f64) -> MetricValue {
    let difference = old
        .and_then(Value::as_number)
        .map(|previous| absolute.minus(previous));
    let difference_per_second = match difference {
        Some(d) if elapsed_seconds != 0.0 => Some(d.as_f64() / elapsed_seconds),
        _ => None,
    };
    MetricValue::Scalar {
        absolute,
        difference,
        difference_per_second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(entries: &[(&str, Value)]) -> Sample {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Scalars
    // -------------------------------------------------------------------------

    #[test]
    fn test_unchanged_scalars_have_zero_difference_and_rate() {
        let s = sample(&[("usage", Value::Integer(42)), ("load", Value::Float(1.5))]);
        let out = diff(&s, &s, 10.0);

        assert_eq!(
            out["usage"],
            MetricValue::Scalar {
                absolute: Number::Integer(42),
                difference: Some(Number::Integer(0)),
                difference_per_second: Some(0.0),
            }
        );
        assert_eq!(
            out["load"],
            MetricValue::Scalar {
                absolute: Number::Float(1.5),
                difference: Some(Number::Float(0.0)),
                difference_per_second: Some(0.0),
            }
        );
    }

    #[test]
    fn test_empty_prior_yields_absolute_only() {
        let s = sample(&[("usage", Value::Integer(7))]);
        for elapsed in [0.0, 1.0, 60.0] {
            let out = diff(&s, &Sample::new(), elapsed);
            assert_eq!(
                out["usage"],
                MetricValue::Scalar {
                    absolute: Number::Integer(7),
                    difference: None,
                    difference_per_second: None,
                }
            );
        }
    }

    #[test]
    fn test_zero_elapsed_suppresses_rate() {
        let new = sample(&[("usage", Value::Integer(150))]);
        let old = sample(&[("usage", Value::Integer(100))]);
        let out = diff(&new, &old, 0.0);

        assert_eq!(
            out["usage"],
            MetricValue::Scalar {
                absolute: Number::Integer(150),
                difference: Some(Number::Integer(50)),
                difference_per_second: None,
            }
        );
    }

    #[test]
    fn test_rate_divides_by_elapsed() {
        let new = sample(&[("usage", Value::Integer(300))]);
        let old = sample(&[("usage", Value::Integer(100))]);
        let out = diff(&new, &old, 4.0);

        match &out["usage"] {
            MetricValue::Scalar {
                difference_per_second,
                ..
            } => assert_eq!(*difference_per_second, Some(50.0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mixed_integer_and_float_difference_is_float() {
        let new = sample(&[("v", Value::Float(2.5))]);
        let old = sample(&[("v", Value::Integer(2))]);
        let out = diff(&new, &old, 1.0);

        match &out["v"] {
            MetricValue::Scalar { difference, .. } => {
                assert_eq!(*difference, Some(Number::Float(0.5)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    // -------------------------------------------------------------------------
    // Keys, lists, nesting
    // -------------------------------------------------------------------------

    #[test]
    fn test_keys_only_in_old_are_dropped() {
        let new = sample(&[("a", Value::Integer(1))]);
        let old = sample(&[("a", Value::Integer(1)), ("gone", Value::Integer(5))]);
        let out = diff(&new, &old, 1.0);

        assert_eq!(out.len(), 1);
        assert!(!out.contains_key("gone"));
    }

    #[test]
    fn test_list_first_sample_has_items_only() {
        let new = sample(&[("tasks", Value::List(vec![Value::Integer(1), Value::Integer(2)]))]);
        let out = diff(&new, &Sample::new(), 1.0);

        assert_eq!(
            out["tasks"],
            MetricValue::SetValued {
                items: vec![Value::Integer(1), Value::Integer(2)],
                added: None,
                removed: None,
            }
        );
    }

    #[test]
    fn test_list_membership_churn() {
        let new = sample(&[("tasks", Value::List(vec![Value::Integer(1), Value::Integer(3), Value::Integer(4)]))]);
        let old = sample(&[("tasks", Value::List(vec![Value::Integer(1), Value::Integer(2)]))]);
        let out = diff(&new, &old, 1.0);

        assert_eq!(
            out["tasks"],
            MetricValue::SetValued {
                items: vec![Value::Integer(1), Value::Integer(3), Value::Integer(4)],
                added: Some(vec![Value::Integer(3), Value::Integer(4)]),
                removed: Some(vec![Value::Integer(2)]),
            }
        );
    }

    #[test]
    fn test_nested_maps_recurse_and_missing_sub_map_is_empty() {
        let mut stat = Sample::new();
        stat.insert("user".into(), Value::Float(3.0));
        let mut old_stat = Sample::new();
        old_stat.insert("user".into(), Value::Float(1.0));

        let new = sample(&[("stat", Value::Map(stat.clone())), ("percpu", Value::Map(stat))]);
        let old = sample(&[("stat", Value::Map(old_stat))]);
        let out = diff(&new, &old, 2.0);

        let user = out["stat"].get("user").unwrap();
        assert_eq!(
            *user,
            MetricValue::Scalar {
                absolute: Number::Float(3.0),
                difference: Some(Number::Float(2.0)),
                difference_per_second: Some(1.0),
            }
        );

        let fresh = out["percpu"].get("user").unwrap();
        assert_eq!(
            *fresh,
            MetricValue::Scalar {
                absolute: Number::Float(3.0),
                difference: None,
                difference_per_second: None,
            }
        );
    }

    #[test]
    fn test_text_passes_through() {
        let new = sample(&[("device", Value::from("sda1"))]);
        let old = sample(&[("device", Value::from("sdb1"))]);
        let out = diff(&new, &old, 1.0);

        assert_eq!(out["device"], MetricValue::Opaque(Value::from("sda1")));
    }

    #[test]
    fn test_type_mismatch_does_not_fail() {
        let new = sample(&[("x", Value::Integer(5)), ("m", Value::Map(Sample::new()))]);
        let old = sample(&[("x", Value::from("five")), ("m", Value::Integer(1))]);
        let out = diff(&new, &old, 1.0);

        assert_eq!(
            out["x"],
            MetricValue::Scalar {
                absolute: Number::Integer(5),
                difference: None,
                difference_per_second: None,
            }
        );
        assert_eq!(out["m"], MetricValue::Nested(BTreeMap::new()));
    }

    #[test]
    fn test_serialization_omits_absent_keys() {
        let new = sample(&[("usage", Value::Integer(7))]);
        let out = diff(&new, &Sample::new(), 1.0);
        let json = serde_json::to_value(&out).unwrap();

        assert_eq!(json, serde_json::json!({ "usage": { "absolute": 7 } }));
    }
}
