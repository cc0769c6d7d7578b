//! Duration literals and the canonical units used by the catalog.
//!
//! Operators write durations as integer components with `h`, `m` and `s` units
//! (`8h24m`, `3403s`). Retention periods are stored as whole seconds and chunk
//! intervals as whole microseconds, the unit TimescaleDB keeps dimension
//! intervals in. Values are printed back in the same literal style, which keeps
//! the last token of `get` output parseable as a duration.

use std::fmt::{self, Write};
use std::time::Duration;

use crate::bail;
use crate::error::{ErrorKind, ObsResult};

pub const MICROS_PER_MILLI: u64 = 1_000;
pub const MICROS_PER_SECOND: u64 = 1_000_000;
pub const SECONDS_PER_MINUTE: u64 = 60;
pub const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
pub const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;
pub const MICROS_PER_HOUR: u64 = SECONDS_PER_HOUR * MICROS_PER_SECOND;

/// Longest policy value accepted, in seconds. Postgres intervals keep their
/// time part in signed 64-bit microseconds, and values are sent as doubles.
pub const MAX_POLICY_SECS: u64 = 100_000_000 * SECONDS_PER_DAY;

/// Parses a duration literal made of `<integer><unit>` components.
///
/// Units are `h`, `m` and `s`. Components may repeat (`1h1h` is two hours).
/// Signs, fractions, unknown or missing units and a zero total are rejected with
/// [`ErrorKind::InvalidDuration`].
pub fn parse_duration_literal(input: &str) -> ObsResult<Duration> {
    let literal = input.trim();
    if literal.is_empty() {
        bail!(ErrorKind::InvalidDuration, "Duration literal is empty");
    }

    let bytes = literal.as_bytes();
    let mut total_secs: u64 = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        let digits_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }

        if digits_start == pos {
            match bytes[pos] {
                b'-' => bail!(
                    ErrorKind::InvalidDuration,
                    "Negative durations are not allowed",
                    format!("`{literal}`")
                ),
                b'+' => bail!(
                    ErrorKind::InvalidDuration,
                    "Signed durations are not allowed",
                    format!("`{literal}`")
                ),
                _ => bail!(
                    ErrorKind::InvalidDuration,
                    "Duration component is missing its value",
                    format!("expected a number at offset {pos} in `{literal}`")
                ),
            }
        }

        // Digits are ASCII, so the slice is valid UTF-8.
        let value: u64 = literal[digits_start..pos].parse().map_err(|_| {
            crate::obs_error!(
                ErrorKind::InvalidDuration,
                "Duration component is out of range",
                format!("`{}` in `{literal}`", &literal[digits_start..pos])
            )
        })?;

        if pos < bytes.len() && bytes[pos] == b'.' {
            bail!(
                ErrorKind::InvalidDuration,
                "Fractional durations are not allowed",
                format!("`{literal}`")
            );
        }

        let unit_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }

        let unit_secs = match &literal[unit_start..pos] {
            "h" => SECONDS_PER_HOUR,
            "m" => SECONDS_PER_MINUTE,
            "s" => 1,
            "" => bail!(
                ErrorKind::InvalidDuration,
                "Duration component is missing its unit",
                format!("`{value}` in `{literal}` needs one of h, m, s")
            ),
            other => bail!(
                ErrorKind::InvalidDuration,
                "Duration unit is not supported",
                format!("unknown unit `{other}` in `{literal}`, use h, m or s")
            ),
        };

        total_secs = value
            .checked_mul(unit_secs)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(|| {
                crate::obs_error!(
                    ErrorKind::InvalidDuration,
                    "Duration is out of range",
                    format!("`{literal}`")
                )
            })?;
    }

    if total_secs == 0 {
        bail!(
            ErrorKind::InvalidDuration,
            "Duration must be positive",
            format!("`{literal}`")
        );
    }

    Ok(Duration::from_secs(total_secs))
}

/// Formats a microsecond count as a duration literal, e.g. `264h0m0s`,
/// `56m43s`, `1.5s` or `250ms`.
pub fn format_duration(micros: u64) -> String {
    if micros == 0 {
        return "0s".to_string();
    }

    if micros < MICROS_PER_MILLI {
        return format!("{micros}µs");
    }

    if micros < MICROS_PER_SECOND {
        return format!("{}ms", format_with_fraction(micros, MICROS_PER_MILLI, 3));
    }

    let total_secs = micros / MICROS_PER_SECOND;
    let hours = total_secs / SECONDS_PER_HOUR;
    let minutes = (total_secs % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let secs_micros = micros % (SECONDS_PER_MINUTE * MICROS_PER_SECOND);

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let _ = write!(
        out,
        "{}s",
        format_with_fraction(secs_micros, MICROS_PER_SECOND, 6)
    );

    out
}

fn format_with_fraction(value: u64, unit: u64, width: usize) -> String {
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return whole.to_string();
    }

    let fraction = format!("{fraction:0width$}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

/// Rounds a microsecond count to the nearest hour, halfway values rounding up.
pub fn round_to_nearest_hour(micros: u64) -> u64 {
    let remainder = micros % MICROS_PER_HOUR;
    if remainder + remainder < MICROS_PER_HOUR {
        micros - remainder
    } else {
        micros.saturating_add(MICROS_PER_HOUR - remainder)
    }
}

/// Data retention period, kept in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RetentionPeriod {
    secs: u64,
}

impl RetentionPeriod {
    /// Creates a retention period from whole seconds.
    pub fn from_secs(secs: u64) -> ObsResult<Self> {
        if secs == 0 {
            bail!(ErrorKind::InvalidDuration, "Retention period must be positive");
        }
        if secs > MAX_POLICY_SECS {
            bail!(
                ErrorKind::InvalidDuration,
                "Retention period is out of range",
                format!("{secs}s exceeds the maximum of {MAX_POLICY_SECS}s")
            );
        }

        Ok(Self { secs })
    }

    /// Creates a retention period from whole days.
    pub fn from_days(days: u64) -> ObsResult<Self> {
        let secs = days.checked_mul(SECONDS_PER_DAY).ok_or_else(|| {
            crate::obs_error!(
                ErrorKind::InvalidDuration,
                "Retention period is out of range",
                format!("{days} days")
            )
        })?;

        Self::from_secs(secs)
    }

    /// Parses a retention argument: a bare integer is a number of days,
    /// anything else must be a duration literal.
    pub fn parse(input: &str) -> ObsResult<Self> {
        let input = input.trim();
        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            let days: u64 = input.parse().map_err(|_| {
                crate::obs_error!(
                    ErrorKind::InvalidDuration,
                    "Retention period is out of range",
                    format!("`{input}` days")
                )
            })?;

            return Self::from_days(days);
        }

        Self::from_secs(parse_duration_literal(input)?.as_secs())
    }

    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    /// Retention periods compare exactly, at seconds granularity.
    pub fn matches(&self, other: &RetentionPeriod) -> bool {
        self.secs == other.secs
    }
}

impl fmt::Display for RetentionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.secs.saturating_mul(MICROS_PER_SECOND)))
    }
}

/// Chunk time interval, kept in whole microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkInterval {
    micros: u64,
}

impl ChunkInterval {
    /// Creates a chunk interval from whole microseconds.
    pub fn from_micros(micros: u64) -> ObsResult<Self> {
        if micros == 0 {
            bail!(ErrorKind::InvalidDuration, "Chunk interval must be positive");
        }
        if micros > MAX_POLICY_SECS * MICROS_PER_SECOND {
            bail!(
                ErrorKind::InvalidDuration,
                "Chunk interval is out of range",
                format!("{micros}µs exceeds the maximum of {MAX_POLICY_SECS}s")
            );
        }

        Ok(Self { micros })
    }

    /// Parses a chunk interval duration literal.
    pub fn parse(input: &str) -> ObsResult<Self> {
        let secs = parse_duration_literal(input)?.as_secs();
        let micros = secs.checked_mul(MICROS_PER_SECOND).ok_or_else(|| {
            crate::obs_error!(
                ErrorKind::InvalidDuration,
                "Chunk interval is out of range",
                format!("`{}`", input.trim())
            )
        })?;

        Self::from_micros(micros)
    }

    pub fn as_micros(&self) -> u64 {
        self.micros
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.micros)
    }

    /// Returns the interval rounded to the nearest hour, in microseconds.
    pub fn rounded_to_hour(&self) -> u64 {
        round_to_nearest_hour(self.micros)
    }

    /// Chunk intervals are equal when they round to the same hour.
    ///
    /// The storage engine quantizes chunk intervals, so a value read back from
    /// the catalog may differ slightly from the one that was written.
    pub fn matches(&self, other: &ChunkInterval) -> bool {
        self.rounded_to_hour() == other.rounded_to_hour()
    }
}

impl fmt::Display for ChunkInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.micros))
    }
}
