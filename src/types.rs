//! Core value types for the state namespace.

use crate::path::PathAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(saturating_micros)
            .unwrap_or(0);
        Timestamp(micros)
    }

    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// This instant shifted forward by `duration`, clamped at the far future.
    pub fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(saturating_micros(duration)))
    }
}

fn saturating_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Typed scalar held by a metric node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl MetricValue {
    /// Name of the variant, for reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricValue::String(_) => "string",
            MetricValue::Integer(_) => "integer",
            MetricValue::Float(_) => "float",
            MetricValue::Boolean(_) => "boolean",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Float(f) => Some(*f),
            MetricValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::String(s) => f.write_str(s),
            MetricValue::Integer(i) => write!(f, "{}", i),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<String> for MetricValue {
    fn from(s: String) -> Self {
        MetricValue::String(s)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::String(s.to_string())
    }
}

impl From<i64> for MetricValue {
    fn from(i: i64) -> Self {
        MetricValue::Integer(i)
    }
}

impl From<i32> for MetricValue {
    fn from(i: i32) -> Self {
        MetricValue::Integer(i64::from(i))
    }
}

impl From<u32> for MetricValue {
    fn from(i: u32) -> Self {
        MetricValue::Integer(i64::from(i))
    }
}

impl From<f64> for MetricValue {
    fn from(f: f64) -> Self {
        MetricValue::Float(f)
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Boolean(b)
    }
}

/// What happened to a metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// One metric-level change produced by applying an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub path: PathAddress,
    pub kind: ChangeKind,
    /// New value for `Added`/`Updated`; `None` for `Removed`.
    pub value: Option<MetricValue>,
}

/// All changes of one committed transition, in operation order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeSet {
    pub version: u64,
    pub changes: Vec<StateChange>,
}

/// Source of "now" for timestamps and expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. Used for deterministic expiry.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: AtomicI64::new(start.0),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.micros.store(at.0, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let now = self.now().saturating_add(by);
        self.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_conversion_saturates() {
        assert_eq!(saturating_micros(Duration::from_millis(3)), 3_000);
        assert_eq!(saturating_micros(Duration::MAX), i64::MAX);
        assert_eq!(Timestamp(1).saturating_add(Duration::MAX), Timestamp(i64::MAX));
        assert!(Timestamp::now() > Timestamp(0));
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(Timestamp::from_secs(10));
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), Timestamp(11_500_000));
    }

    #[test]
    fn test_saturating_add_clamps() {
        let t = Timestamp(i64::MAX - 1);
        assert_eq!(t.saturating_add(Duration::from_secs(10)), Timestamp(i64::MAX));
        assert_eq!(t.saturating_add(Duration::MAX), Timestamp(i64::MAX));
    }

    #[test]
    fn test_metric_value_accessors() {
        assert_eq!(MetricValue::from(3i64).as_i64(), Some(3));
        assert_eq!(MetricValue::from(3i64).as_f64(), Some(3.0));
        assert_eq!(MetricValue::from("x").as_str(), Some("x"));
        assert_eq!(MetricValue::from(true).as_bool(), Some(true));
        assert_eq!(MetricValue::from(1.5).as_i64(), None);
        assert_eq!(MetricValue::from(1.5).type_name(), "float");
    }

    #[test]
    fn test_metric_value_serde_shape() {
        let json = serde_json::to_value(MetricValue::from(42i64)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "integer", "value": 42}));
    }
}
