//! Dependency-ordered metric computation and output validation.

use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::types::RunRecord;
use crate::metrics::metric::{JsonObject, Metric, MetricContext, MetricScope, MetricsError};
use crate::metrics::registry::MetricsRegistry;

/// Computes and validates metric values for one turn or one run.
///
/// Both entry points share one algorithm: resolve the requested keys into a
/// deterministically ordered dependency closure, compute each metric with a
/// dependency-only view of prior outputs, validate every output strictly
/// against its schema, and abort the whole call on the first failure — no
/// partial metrics object is ever returned.
pub struct MetricsCollector<'a> {
    registry: &'a MetricsRegistry,
}

impl<'a> MetricsCollector<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        Self { registry }
    }

    /// Collect TURN-scope metrics for one recorded turn.
    ///
    /// The returned object contains every metric in the transitive closure
    /// of `requested`, not only the explicitly requested keys: downstream
    /// consumers read dependency outputs by key.
    pub fn collect_turn_metrics(
        &self,
        run: &RunRecord,
        turn_number: u32,
        requested: &[String],
    ) -> Result<JsonObject, MetricsError> {
        let turn = run.turn(turn_number).ok_or_else(|| {
            MetricsError::Configuration(format!(
                "turn {turn_number} not recorded for run '{}'",
                run.summary.run_id
            ))
        })?;
        let ctx = MetricContext {
            run,
            turn: Some(turn),
        };
        self.collect(MetricScope::Turn, &ctx, requested)
    }

    /// Collect RUN-scope metrics over the whole run.
    pub fn collect_run_metrics(
        &self,
        run: &RunRecord,
        requested: &[String],
    ) -> Result<JsonObject, MetricsError> {
        let ctx = MetricContext { run, turn: None };
        self.collect(MetricScope::Run, &ctx, requested)
    }

    fn collect(
        &self,
        scope: MetricScope,
        ctx: &MetricContext<'_>,
        requested: &[String],
    ) -> Result<JsonObject, MetricsError> {
        // Configuration errors (unknown key, scope mismatch) surface here,
        // before any computation runs.
        let order = self.registry.resolve(scope, requested)?;

        let mut outputs = JsonObject::new();
        for metric in order {
            let prior = dependency_view(metric, &outputs);
            let value = metric.compute(ctx, &prior)?;
            validate_output(metric, &value)?;
            debug!(key = metric.key(), scope = scope.label(), "metric computed");
            outputs.insert(metric.key().to_string(), value);
        }
        Ok(outputs)
    }
}

/// Restrict prior outputs to a metric's declared dependencies.
fn dependency_view(metric: &dyn Metric, outputs: &JsonObject) -> JsonObject {
    let mut view = JsonObject::new();
    for dep in metric.requires() {
        if let Some(value) = outputs.get(*dep) {
            view.insert(dep.to_string(), value.clone());
        }
    }
    view
}

/// Strict JSON Schema validation (Draft 2020-12) of a computed value.
fn validate_output(metric: &dyn Metric, value: &Value) -> Result<(), MetricsError> {
    let schema = metric.output_schema();
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| {
            MetricsError::Configuration(format!(
                "metric '{}' has an invalid output schema: {err}",
                metric.key()
            ))
        })?;
    let messages: Vec<String> = compiled
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(MetricsError::Computation {
            key: metric.key().to_string(),
            reason: format!("output failed schema validation: {}", messages.join("; ")),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::metric::MetricScope;
    use crate::test_support::{empty_run_record, static_metric, turn_record};
    use serde_json::json;

    fn registry(metrics: Vec<crate::test_support::StaticMetric>) -> MetricsRegistry {
        MetricsRegistry::from_metrics(
            metrics
                .into_iter()
                .map(|metric| Box::new(metric) as Box<dyn Metric>)
                .collect(),
        )
        .expect("registry")
    }

    fn run_with_one_turn() -> RunRecord {
        let mut run = empty_run_record("run-1");
        run.turns.push(turn_record(0));
        run
    }

    /// Keys of the result are exactly the closure of the requested keys.
    #[test]
    fn collect_returns_closure_keys() {
        let registry = registry(vec![
            static_metric("a.base", MetricScope::Turn, &[]),
            static_metric("b.derived", MetricScope::Turn, &["a.base"]),
            static_metric("c.unrelated", MetricScope::Turn, &[]),
        ]);
        let run = run_with_one_turn();
        let collector = MetricsCollector::new(&registry);

        let outputs = collector
            .collect_turn_metrics(&run, 0, &["b.derived".to_string()])
            .expect("collect");
        let keys: Vec<&str> = outputs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a.base", "b.derived"]);
    }

    /// A compute failure aborts the call; no partial object is returned.
    #[test]
    fn collect_aborts_on_compute_failure() {
        let registry = registry(vec![
            static_metric("a.base", MetricScope::Turn, &[]),
            static_metric("b.broken", MetricScope::Turn, &["a.base"]).failing("boom"),
        ]);
        let run = run_with_one_turn();
        let collector = MetricsCollector::new(&registry);

        let err = collector
            .collect_turn_metrics(&run, 0, &["b.broken".to_string()])
            .expect_err("expected error");
        assert!(matches!(err, MetricsError::Computation { .. }));
        assert!(err.to_string().contains("boom"));
    }

    /// An output that does not match its schema is a computation error.
    #[test]
    fn collect_rejects_schema_violations() {
        let registry = registry(vec![static_metric("a.bad", MetricScope::Turn, &[])
            .with_output(json!("not a number"), json!({"type": "integer"}))]);
        let run = run_with_one_turn();
        let collector = MetricsCollector::new(&registry);

        let err = collector
            .collect_turn_metrics(&run, 0, &["a.bad".to_string()])
            .expect_err("expected error");
        assert!(err.to_string().contains("schema validation"));
    }

    /// Requesting a RUN-scope key via turn collection fails before compute.
    #[test]
    fn collect_turn_rejects_run_scope_key() {
        let registry = registry(vec![
            static_metric("run.only", MetricScope::Run, &[]).failing("must not compute")
        ]);
        let run = run_with_one_turn();
        let collector = MetricsCollector::new(&registry);

        let err = collector
            .collect_turn_metrics(&run, 0, &["run.only".to_string()])
            .expect_err("expected error");
        assert!(matches!(err, MetricsError::Configuration(_)));
    }

    /// A metric only sees the outputs of its declared dependencies.
    #[test]
    fn compute_receives_dependency_only_prior() {
        let registry = registry(vec![
            static_metric("a.base", MetricScope::Run, &[]).with_output(json!(7), json!({"type": "integer"})),
            static_metric("b.other", MetricScope::Run, &[]),
            static_metric("c.probe", MetricScope::Run, &["a.base"]).echoing_prior(),
        ]);
        let run = empty_run_record("run-1");
        let collector = MetricsCollector::new(&registry);

        let outputs = collector
            .collect_run_metrics(
                &run,
                &["b.other".to_string(), "c.probe".to_string()],
            )
            .expect("collect");
        // The probe echoes its prior view: only a.base must be visible.
        assert_eq!(outputs["c.probe"], json!({"a.base": 7}));
    }

    #[test]
    fn collect_turn_errors_on_unrecorded_turn() {
        let registry = registry(vec![static_metric("a.base", MetricScope::Turn, &[])]);
        let run = empty_run_record("run-1");
        let collector = MetricsCollector::new(&registry);

        let err = collector
            .collect_turn_metrics(&run, 3, &["a.base".to_string()])
            .expect_err("expected error");
        assert!(err.to_string().contains("turn 3 not recorded"));
    }
}
