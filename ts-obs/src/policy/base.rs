use std::fmt;

use crate::bail;
use crate::duration::{ChunkInterval, RetentionPeriod};
use crate::error::{ErrorKind, ObsResult};

/// Retention applied when no default was ever configured.
pub const SYSTEM_DEFAULT_RETENTION_DAYS: u64 = 90;

/// Chunk interval applied when no default was ever configured.
pub const SYSTEM_DEFAULT_CHUNK_INTERVAL_HOURS: u64 = 8;

/// The two kinds of storage policy a metric has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Retention,
    ChunkInterval,
}

impl PolicyKind {
    /// Parses a command line value for this kind.
    ///
    /// This is local validation: it runs before anything touches the network.
    pub fn parse_value(&self, input: &str) -> ObsResult<PolicyValue> {
        let value = match self {
            PolicyKind::Retention => PolicyValue::Retention(RetentionPeriod::parse(input)?),
            PolicyKind::ChunkInterval => {
                PolicyValue::ChunkInterval(ChunkInterval::parse(input)?)
            }
        };

        Ok(value)
    }

    /// Returns the value used when neither an override nor a default exists.
    pub fn system_default(&self) -> PolicyValue {
        match self {
            PolicyKind::Retention => PolicyValue::Retention(
                RetentionPeriod::from_days(SYSTEM_DEFAULT_RETENTION_DAYS)
                    .expect("system default retention is positive"),
            ),
            PolicyKind::ChunkInterval => PolicyValue::ChunkInterval(
                ChunkInterval::from_micros(
                    SYSTEM_DEFAULT_CHUNK_INTERVAL_HOURS * crate::duration::MICROS_PER_HOUR,
                )
                .expect("system default chunk interval is positive"),
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Retention => "retention",
            PolicyKind::ChunkInterval => "chunk-interval",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy value in its canonical unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyValue {
    Retention(RetentionPeriod),
    ChunkInterval(ChunkInterval),
}

impl PolicyValue {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyValue::Retention(_) => PolicyKind::Retention,
            PolicyValue::ChunkInterval(_) => PolicyKind::ChunkInterval,
        }
    }

    /// Compares two values with the rule of their kind: exact for retention,
    /// nearest hour for chunk intervals. Values of different kinds never match.
    pub fn matches(&self, other: &PolicyValue) -> bool {
        match (self, other) {
            (PolicyValue::Retention(a), PolicyValue::Retention(b)) => a.matches(b),
            (PolicyValue::ChunkInterval(a), PolicyValue::ChunkInterval(b)) => a.matches(b),
            _ => false,
        }
    }
}

impl fmt::Display for PolicyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyValue::Retention(period) => period.fmt(f),
            PolicyValue::ChunkInterval(interval) => interval.fmt(f),
        }
    }
}

/// Name of a metric, which is also the name of its hypertable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricName(String);

impl MetricName {
    pub fn new(name: impl Into<String>) -> ObsResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            bail!(ErrorKind::InvalidArgument, "Metric name cannot be empty");
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-metric override state of one policy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyOverride {
    /// The metric uses this value regardless of the default.
    Explicit(PolicyValue),
    /// The metric follows the default.
    #[default]
    Inherited,
}

/// Cluster-wide default of one policy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultPolicy {
    /// Set with `set-default`.
    Configured(PolicyValue),
    /// Never configured; the system default applies.
    #[default]
    System,
}

/// Applies precedence: explicit override, then configured default, then the
/// system default of `kind`.
///
/// Only catalogs without a combined accessor need this; the Promscale catalog
/// resolves precedence in its own stored functions.
pub fn resolve_effective(
    kind: PolicyKind,
    metric_override: PolicyOverride,
    default: DefaultPolicy,
) -> PolicyValue {
    match (metric_override, default) {
        (PolicyOverride::Explicit(value), _) => value,
        (PolicyOverride::Inherited, DefaultPolicy::Configured(value)) => value,
        (PolicyOverride::Inherited, DefaultPolicy::System) => kind.system_default(),
    }
}

/// One policy operation, with all local validation already done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOperation {
    SetDefault {
        value: PolicyValue,
    },
    Set {
        metric: MetricName,
        value: PolicyValue,
    },
    Reset {
        kind: PolicyKind,
        metric: MetricName,
    },
    Get {
        kind: PolicyKind,
        metric: MetricName,
    },
    Verify {
        metric: MetricName,
        expected: PolicyValue,
    },
}

impl PolicyOperation {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyOperation::SetDefault { value }
            | PolicyOperation::Set { value, .. }
            | PolicyOperation::Verify {
                expected: value, ..
            } => value.kind(),
            PolicyOperation::Reset { kind, .. } | PolicyOperation::Get { kind, .. } => *kind,
        }
    }

    pub fn metric(&self) -> Option<&MetricName> {
        match self {
            PolicyOperation::SetDefault { .. } => None,
            PolicyOperation::Set { metric, .. }
            | PolicyOperation::Reset { metric, .. }
            | PolicyOperation::Get { metric, .. }
            | PolicyOperation::Verify { metric, .. } => Some(metric),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyOperation::SetDefault { .. } => "set-default",
            PolicyOperation::Set { .. } => "set",
            PolicyOperation::Reset { .. } => "reset",
            PolicyOperation::Get { .. } => "get",
            PolicyOperation::Verify { .. } => "verify",
        }
    }
}

impl fmt::Display for PolicyOperation {
    /// Formats as e.g. ``retention set for metric `go_info` ``.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.name())?;
        if let Some(metric) = self.metric() {
            write!(f, " for metric `{metric}`")?;
        }

        Ok(())
    }
}

/// What an operation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// A write was accepted by the catalog.
    Applied,
    /// The effective value read from the catalog.
    Effective(PolicyValue),
    /// The effective value matched the expected one.
    Verified(PolicyValue),
}
