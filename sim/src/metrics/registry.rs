//! Catalog of registered metrics with dependency-graph validation.

use std::collections::{BTreeMap, BTreeSet};

use crate::metrics::metric::{Metric, MetricScope, MetricsError};

/// Immutable catalog of metrics keyed by their globally unique KEY.
///
/// Construction validates the whole graph up front: unique keys, known
/// same-scope dependencies, and acyclicity. Violations are fatal
/// configuration errors, not per-run failures. The registry is built once
/// in the composition root and injected by reference; nothing registers
/// itself at import time.
#[derive(Debug)]
pub struct MetricsRegistry {
    metrics: BTreeMap<String, Box<dyn Metric>>,
}

impl MetricsRegistry {
    pub fn from_metrics(metrics: Vec<Box<dyn Metric>>) -> Result<Self, MetricsError> {
        let mut map: BTreeMap<String, Box<dyn Metric>> = BTreeMap::new();
        for metric in metrics {
            let key = metric.key().to_string();
            if map.insert(key.clone(), metric).is_some() {
                return Err(MetricsError::Configuration(format!(
                    "duplicate metric key '{key}'"
                )));
            }
        }
        let registry = Self { metrics: map };
        registry.validate_graph()?;
        Ok(registry)
    }

    pub fn get(&self, key: &str) -> Option<&dyn Metric> {
        self.metrics.get(key).map(Box::as_ref)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    /// Registered keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Split requested keys by scope, preserving request order.
    ///
    /// An unknown key is a configuration error; the caller uses the split to
    /// route keys to turn-scope and run-scope collection.
    pub fn partition_by_scope(
        &self,
        requested: &[String],
    ) -> Result<(Vec<String>, Vec<String>), MetricsError> {
        let mut turn_keys = Vec::new();
        let mut run_keys = Vec::new();
        for key in requested {
            let metric = self.metrics.get(key).ok_or_else(|| {
                MetricsError::Configuration(format!("unknown metric key '{key}'"))
            })?;
            match metric.scope() {
                MetricScope::Turn => turn_keys.push(key.clone()),
                MetricScope::Run => run_keys.push(key.clone()),
            }
        }
        Ok((turn_keys, run_keys))
    }

    /// Transitive closure of `requested` in deterministic evaluation order.
    ///
    /// Every dependency precedes its dependents; ties are broken by
    /// ascending key, so the same requested set always yields the same
    /// order. Requesting an unknown key or a key of the wrong scope is a
    /// configuration error raised before any computation.
    pub fn resolve(
        &self,
        scope: MetricScope,
        requested: &[String],
    ) -> Result<Vec<&dyn Metric>, MetricsError> {
        let mut stack: Vec<&str> = Vec::new();
        for key in requested {
            let metric = self.metrics.get(key).ok_or_else(|| {
                MetricsError::Configuration(format!("unknown metric key '{key}'"))
            })?;
            if metric.scope() != scope {
                return Err(MetricsError::Configuration(format!(
                    "metric '{key}' has scope {}, requested via {} collection",
                    metric.scope().label(),
                    scope.label()
                )));
            }
            stack.push(key.as_str());
        }

        // Dependencies were checked to exist at construction time.
        let mut closure: BTreeSet<&str> = BTreeSet::new();
        while let Some(key) = stack.pop() {
            if !closure.insert(key) {
                continue;
            }
            for &dep in self.metrics[key].requires() {
                stack.push(dep);
            }
        }

        Ok(self.topo_order(&closure))
    }

    /// Kahn's algorithm with a sorted ready set for ascending-key ties.
    fn topo_order(&self, closure: &BTreeSet<&str>) -> Vec<&dyn Metric> {
        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for &key in closure {
            let deps = self.metrics[key].requires();
            indegree.insert(key, deps.len());
            for &dep in deps {
                dependents.entry(dep).or_default().push(key);
            }
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(key, _)| *key)
            .collect();

        let mut order = Vec::with_capacity(closure.len());
        while let Some(key) = ready.pop_first() {
            order.push(self.metrics[key].as_ref());
            for &dependent in dependents.get(key).into_iter().flatten() {
                let degree = indegree.get_mut(dependent).expect("dependent in closure");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }

        debug_assert_eq!(order.len(), closure.len());
        order
    }

    fn validate_graph(&self) -> Result<(), MetricsError> {
        for (key, metric) in &self.metrics {
            for dep in metric.requires() {
                let dep_metric = self.metrics.get(*dep).ok_or_else(|| {
                    MetricsError::Configuration(format!(
                        "metric '{key}' requires unknown metric '{dep}'"
                    ))
                })?;
                if dep_metric.scope() != metric.scope() {
                    return Err(MetricsError::Configuration(format!(
                        "metric '{key}' ({}) requires '{dep}' ({}): dependencies must share scope",
                        metric.scope().label(),
                        dep_metric.scope().label()
                    )));
                }
            }
        }
        self.check_acyclic()
    }

    /// Depth-first cycle detection over every registered key.
    fn check_acyclic(&self) -> Result<(), MetricsError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        for start in self.metrics.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }
            // Explicit stack: (key, next dependency index).
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            marks.insert(start.as_str(), Mark::InProgress);
            while let Some((key, next_dep)) = stack.pop() {
                let deps = self.metrics[key].requires();
                if next_dep >= deps.len() {
                    marks.insert(key, Mark::Done);
                    continue;
                }
                stack.push((key, next_dep + 1));
                let dep = deps[next_dep];
                match marks.get(dep) {
                    Some(Mark::InProgress) => {
                        return Err(MetricsError::Configuration(format!(
                            "metric dependency cycle involving '{dep}'"
                        )));
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(dep, Mark::InProgress);
                        stack.push((dep, 0));
                    }
                }
            }
        }
        Ok(())
    }
}
