//! Metric computation contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::types::{RunRecord, TurnRecord};

/// Whether a metric is computed per turn or once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricScope {
    Turn,
    Run,
}

impl MetricScope {
    pub fn label(self) -> &'static str {
        match self {
            MetricScope::Turn => "turn",
            MetricScope::Run => "run",
        }
    }
}

/// Validated metric outputs keyed by metric key.
///
/// Grows monotonically during one collection pass; only schema-validated
/// values are ever inserted.
pub type JsonObject = Map<String, Value>;

/// Errors from the metrics subsystem.
///
/// `Configuration` covers fatal registry misconfigurations (duplicate or
/// unknown keys, cycles, scope mismatches) detected at construction or
/// resolution time, never retried. `Computation` covers a metric whose
/// `compute` failed or whose output failed schema validation; it aborts the
/// enclosing collection call and, by current design, the run.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric configuration error: {0}")]
    Configuration(String),

    #[error("metric '{key}' failed: {reason}")]
    Computation { key: String, reason: String },
}

/// Inputs available to a metric computation.
#[derive(Debug, Clone, Copy)]
pub struct MetricContext<'a> {
    pub run: &'a RunRecord,
    /// Present for TURN-scope collection, absent for RUN scope.
    pub turn: Option<&'a TurnRecord>,
}

impl<'a> MetricContext<'a> {
    /// The turn under computation, for TURN-scope metrics.
    pub fn require_turn(&self) -> Result<&'a TurnRecord, MetricsError> {
        self.turn.ok_or_else(|| {
            MetricsError::Configuration("turn context missing for turn-scope metric".to_string())
        })
    }
}

/// A single pure computation unit.
///
/// Given the same context, dependencies, and prior outputs, `compute` must
/// return the same JSON value. No side effects, no I/O.
pub trait Metric: std::fmt::Debug {
    /// Globally unique key, e.g. `turn.actions.total`.
    fn key(&self) -> &str;

    fn scope(&self) -> MetricScope;

    /// Keys of same-scope metrics whose validated outputs this metric reads.
    fn requires(&self) -> &[&str] {
        &[]
    }

    /// JSON Schema (Draft 2020-12) every output value must satisfy.
    fn output_schema(&self) -> Value;

    /// Compute the metric value. `prior` holds only the already-validated
    /// outputs of the declared dependencies.
    fn compute(&self, ctx: &MetricContext<'_>, prior: &JsonObject) -> Result<Value, MetricsError>;
}
