//! Block I/O specifics: device naming and per-device regrouping.
//!
//! The blkio controller reports each counter file as a list of devices, so a
//! raw sample is shaped `counter -> device -> stats`. Documents are emitted
//! per device, which means the sample has to be turned inside out before it
//! can be diffed.

use std::collections::BTreeMap;

use crate::diff::{diff, MetricValue, Sample, Value};

/// Resolves a `major:minor` token to a device name. Unparsable tokens are
/// returned unchanged.
pub fn resolve_device(majmin: &str) -> String {
    let Some((major, minor)) = majmin.split_once(':') else {
        return majmin.to_string();
    };
    match (major.parse::<u32>(), minor.parse::<u32>()) {
        (Ok(major), Ok(minor)) => device_name(major, minor),
        _ => majmin.to_string(),
    }
}

/// Device name for a major/minor pair.
///
/// SCSI disks (8 and 112) use `sd<disk><partition>` where the disk index is
/// `minor / 8` and the partition is `minor % 8 + 1`. Device mapper (252) is
/// `dm-<minor>`. Anything else stays `major:minor`.
pub fn device_name(major: u32, minor: u32) -> String {
    match major {
        8 | 112 => format!("sd{}{}", disk_letters(minor / 8), minor % 8 + 1),
        252 => format!("dm-{}", minor),
        _ => format!("{}:{}", major, minor),
    }
}

/// `0 -> a`, `25 -> z`, `26 -> aa`.
fn disk_letters(index: u32) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Fields that carry one entry per device.
pub fn is_device_keyed(field: &str) -> bool {
    field.starts_with("io_") || field.starts_with("time") || field.starts_with("throttle_")
}

/// Turns `counter -> device -> stats` into `device -> counter -> stats`.
///
/// Every device map carries its own `device` name and all fields that are
/// not device-keyed (such as `tasks`).
pub fn regroup(sample: &Sample) -> BTreeMap<String, Sample> {
    let mut devices: BTreeMap<String, Sample> = BTreeMap::new();
    let mut shared = Sample::new();

    for (field, value) in sample {
        match value {
            Value::Map(per_device) if is_device_keyed(field) => {
                for (dev, stats) in per_device {
                    devices
                        .entry(dev.clone())
                        .or_insert_with(|| {
                            let mut s = Sample::new();
                            s.insert("device".into(), Value::Text(dev.clone()));
                            s
                        })
                        .insert(field.clone(), stats.clone());
                }
            }
            _ => {
                shared.insert(field.clone(), value.clone());
            }
        }
    }

    for stats in devices.values_mut() {
        for (field, value) in &shared {
            stats.insert(field.clone(), value.clone());
        }
    }

    devices
}

/// Diffs current against previous per device. Devices missing from the
/// previous sample are diffed against an empty map; devices that vanished
/// are not reported.
pub fn device_diffs(
    new: &Sample,
    old: &Sample,
    elapsed_seconds: f64,
) -> Vec<(String, BTreeMap<String, MetricValue>)> {
    let current = regroup(new);
    let previous = regroup(old);
    let empty = Sample::new();

    current
        .iter()
        .map(|(dev, stats)| {
            let prior = previous.get(dev).unwrap_or(&empty);
            (dev.clone(), diff(stats, prior, elapsed_seconds))
        })
        .collect()
}
