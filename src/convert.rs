//! Field converters from raw kernel/`ps` tokens to typed values.
//!
//! Every converter returns `None` instead of failing; callers treat `None`
//! as "field omitted from this cycle's sample".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::diff::Value;

/// `[[DD-]HH:]MM:SS`, as printed by `ps` for `time` and `etime`.
static ELAPSED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:(\d+)-)?(\d+):)?(\d+):(\d+)$").expect("elapsed time regex is valid")
});

/// Kernel scheduling clock ticks per second (USER_HZ).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTicks(f64);

impl ClockTicks {
    /// Fixed tick rate, mainly for tests.
    pub const fn new(per_second: f64) -> Self {
        Self(per_second)
    }

    /// Queries the running system (usually 100, but can vary).
    pub fn detect() -> Self {
        #[cfg(unix)]
        {
            // SAFETY: sysconf is safe to call with _SC_CLK_TCK
            // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
            unsafe {
                let tck = libc::sysconf(libc::_SC_CLK_TCK);
                if tck > 0 {
                    return Self(tck as f64);
                }
            }
        }
        Self(100.0)
    }

    pub fn per_second(self) -> f64 {
        self.0
    }
}

/// Unit conversion applied to one raw token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// Keep the token as text.
    Raw,
    Integer,
    Float,
    /// Kilobytes to bytes.
    Kilobyte,
    /// Nanoseconds to seconds.
    Nanosecond,
    /// Microseconds to seconds.
    Microsecond,
    /// Milliseconds to seconds.
    Millisecond,
    /// USER_HZ ticks to seconds.
    UserHz,
    /// `[[DD-]HH:]MM:SS` to seconds.
    ElapsedTime,
}

impl Converter {
    pub fn convert(self, raw: &str, ticks: ClockTicks) -> Option<Value> {
        let token = raw.trim();
        match self {
            Converter::Raw => Some(Value::Text(token.to_string())),
            Converter::Integer => parse_integer(token),
            Converter::Float => token.parse::<f64>().ok().map(Value::Float),
            Converter::Kilobyte => match parse_integer(token)? {
                Value::Integer(kb) => Some(match kb.checked_mul(1024) {
                    Some(bytes) => Value::Integer(bytes),
                    None => Value::Float(kb as f64 * 1024.0),
                }),
                Value::Float(kb) => Some(Value::Float(kb * 1024.0)),
                _ => None,
            },
            Converter::Nanosecond => scaled(token, 1_000_000_000.0),
            Converter::Microsecond => scaled(token, 1_000_000.0),
            Converter::Millisecond => scaled(token, 1_000.0),
            Converter::UserHz => scaled(token, ticks.per_second()),
            Converter::ElapsedTime => parse_elapsed_seconds(token).map(Value::Integer),
        }
    }
}

/// Counters that overflow `i64` are kept as floats rather than dropped.
fn parse_integer(token: &str) -> Option<Value> {
    if let Ok(v) = token.parse::<i64>() {
        return Some(Value::Integer(v));
    }
    token.parse::<u64>().ok().map(|v| Value::Float(v as f64))
}

fn scaled(token: &str, divisor: f64) -> Option<Value> {
    let v: f64 = token.parse().ok()?;
    Some(Value::Float(v / divisor))
}

/// Parses `[[DD-]HH:]MM:SS` into total seconds. Absent components count as zero.
pub fn parse_elapsed_seconds(s: &str) -> Option<i64> {
    let caps = ELAPSED_RE.captures(s.trim())?;
    let part = |i: usize| -> Option<i64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let days = part(1)?;
    let hours = part(2)?;
    let minutes = part(3)?;
    let seconds = part(4)?;

    days.checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HZ: ClockTicks = ClockTicks(100.0);

    // -------------------------------------------------------------------------
    // Tests for parse_elapsed_seconds
    // -------------------------------------------------------------------------

    #[test]
    fn test_elapsed_with_days() {
        assert_eq!(parse_elapsed_seconds("1-02:03:04"), Some(93784));
    }

    #[test]
    fn test_elapsed_minutes_seconds() {
        assert_eq!(parse_elapsed_seconds("05:06"), Some(306));
    }

    #[test]
    fn test_elapsed_hours() {
        assert_eq!(parse_elapsed_seconds("10:00:01"), Some(36001));
    }

    #[test]
    fn test_elapsed_overflow_is_rejected() {
        assert_eq!(parse_elapsed_seconds("999999999999999-00:00:00"), None);
        assert_eq!(
            Converter::ElapsedTime.convert("999999999999999-00:00:00", HZ),
            None
        );
    }

    #[test]
    fn test_elapsed_unparsable() {
        assert_eq!(parse_elapsed_seconds("abc"), None);
        assert_eq!(parse_elapsed_seconds("1-05"), None);
        assert_eq!(Converter::ElapsedTime.convert("-", HZ), None);
    }

    // -------------------------------------------------------------------------
    // Tests for Converter::convert
    // -------------------------------------------------------------------------

    #[test]
    fn test_integer_trims_newline() {
        assert_eq!(
            Converter::Integer.convert("1048576\n", HZ),
            Some(Value::Integer(1048576))
        );
        assert_eq!(Converter::Integer.convert("12x", HZ), None);
    }

    #[test]
    fn test_integer_beyond_i64_becomes_float() {
        assert_eq!(
            Converter::Integer.convert("18446744073709551615", HZ),
            Some(Value::Float(18446744073709551615u64 as f64))
        );
    }

    #[test]
    fn test_kilobyte_to_bytes() {
        assert_eq!(Converter::Kilobyte.convert("4", HZ), Some(Value::Integer(4096)));
    }

    #[test]
    fn test_time_units_to_seconds() {
        assert_eq!(
            Converter::Nanosecond.convert("1500000000", HZ),
            Some(Value::Float(1.5))
        );
        assert_eq!(
            Converter::Microsecond.convert("100000", HZ),
            Some(Value::Float(0.1))
        );
        assert_eq!(Converter::Millisecond.convert("250", HZ), Some(Value::Float(0.25)));
    }

    #[test]
    fn test_user_hz_uses_supplied_tick_rate() {
        assert_eq!(Converter::UserHz.convert("250", HZ), Some(Value::Float(2.5)));
        assert_eq!(
            Converter::UserHz.convert("250", ClockTicks::new(250.0)),
            Some(Value::Float(1.0))
        );
    }

    #[test]
    fn test_detected_clock_ticks_positive() {
        assert!(ClockTicks::detect().per_second() > 0.0);
    }

    #[test]
    fn test_raw_keeps_text() {
        assert_eq!(
            Converter::Raw.convert(" bash ", HZ),
            Some(Value::Text("bash".into()))
        );
    }
}
