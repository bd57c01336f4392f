//! Built-in metric catalog.
//!
//! Metrics are assembled explicitly by [`default_registry`] in the
//! composition root and injected from there; nothing registers itself at
//! import time.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};

use crate::core::types::{AcceptedAction, Action, TurnRecord};
use crate::metrics::metric::{JsonObject, Metric, MetricContext, MetricScope, MetricsError};
use crate::metrics::registry::MetricsRegistry;

/// Registry holding every built-in metric.
pub fn default_registry() -> Result<MetricsRegistry, MetricsError> {
    MetricsRegistry::from_metrics(vec![
        Box::new(TurnCountsByType),
        Box::new(TurnTotal),
        Box::new(TurnActingAgents),
        Box::new(RunCountsByType),
        Box::new(RunTotal),
        Box::new(RunTurnsCompleted),
        Box::new(RunUniqueFollowEdges),
    ])
}

fn counts_by_type<'a, I>(actions: I) -> BTreeMap<&'static str, u64>
where
    I: Iterator<Item = &'a AcceptedAction>,
{
    let mut counts = BTreeMap::new();
    for accepted in actions {
        *counts.entry(accepted.action.action_type().label()).or_insert(0) += 1;
    }
    counts
}

fn turn_actions(turn: &TurnRecord) -> impl Iterator<Item = &AcceptedAction> {
    turn.actions.values().flatten()
}

fn counts_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": {"type": "integer", "minimum": 0}
    })
}

fn count_schema() -> Value {
    json!({"type": "integer", "minimum": 0})
}

/// Sum the entries of a counts-by-type object produced by a dependency.
fn sum_counts(key: &str, prior: &JsonObject, dep: &str) -> Result<u64, MetricsError> {
    let counts = prior
        .get(dep)
        .and_then(Value::as_object)
        .ok_or_else(|| MetricsError::Computation {
            key: key.to_string(),
            reason: format!("missing dependency output '{dep}'"),
        })?;
    let mut total = 0u64;
    for (action_type, count) in counts {
        total += count.as_u64().ok_or_else(|| MetricsError::Computation {
            key: key.to_string(),
            reason: format!("non-integer count for '{action_type}'"),
        })?;
    }
    Ok(total)
}

/// `turn.actions.counts_by_type` — accepted actions in one turn, by type.
#[derive(Debug)]
struct TurnCountsByType;

impl Metric for TurnCountsByType {
    fn key(&self) -> &str {
        "turn.actions.counts_by_type"
    }

    fn scope(&self) -> MetricScope {
        MetricScope::Turn
    }

    fn output_schema(&self) -> Value {
        counts_schema()
    }

    fn compute(&self, ctx: &MetricContext<'_>, _prior: &JsonObject) -> Result<Value, MetricsError> {
        let turn = ctx.require_turn()?;
        Ok(json!(counts_by_type(turn_actions(turn))))
    }
}

/// `turn.actions.total` — sum over `turn.actions.counts_by_type`.
#[derive(Debug)]
struct TurnTotal;

impl Metric for TurnTotal {
    fn key(&self) -> &str {
        "turn.actions.total"
    }

    fn scope(&self) -> MetricScope {
        MetricScope::Turn
    }

    fn requires(&self) -> &[&str] {
        &["turn.actions.counts_by_type"]
    }

    fn output_schema(&self) -> Value {
        count_schema()
    }

    fn compute(&self, _ctx: &MetricContext<'_>, prior: &JsonObject) -> Result<Value, MetricsError> {
        let total = sum_counts(self.key(), prior, "turn.actions.counts_by_type")?;
        Ok(json!(total))
    }
}

/// `turn.actions.acting_agents` — agents with at least one accepted action.
#[derive(Debug)]
struct TurnActingAgents;

impl Metric for TurnActingAgents {
    fn key(&self) -> &str {
        "turn.actions.acting_agents"
    }

    fn scope(&self) -> MetricScope {
        MetricScope::Turn
    }

    fn output_schema(&self) -> Value {
        count_schema()
    }

    fn compute(&self, ctx: &MetricContext<'_>, _prior: &JsonObject) -> Result<Value, MetricsError> {
        let turn = ctx.require_turn()?;
        let acting = turn
            .actions
            .values()
            .filter(|actions| !actions.is_empty())
            .count();
        Ok(json!(acting))
    }
}

/// `run.actions.counts_by_type` — accepted actions across all turns, by type.
#[derive(Debug)]
struct RunCountsByType;

impl Metric for RunCountsByType {
    fn key(&self) -> &str {
        "run.actions.counts_by_type"
    }

    fn scope(&self) -> MetricScope {
        MetricScope::Run
    }

    fn output_schema(&self) -> Value {
        counts_schema()
    }

    fn compute(&self, ctx: &MetricContext<'_>, _prior: &JsonObject) -> Result<Value, MetricsError> {
        let actions = ctx.run.turns.iter().flat_map(turn_actions);
        Ok(json!(counts_by_type(actions)))
    }
}

/// `run.actions.total` — sum over `run.actions.counts_by_type`.
#[derive(Debug)]
struct RunTotal;

impl Metric for RunTotal {
    fn key(&self) -> &str {
        "run.actions.total"
    }

    fn scope(&self) -> MetricScope {
        MetricScope::Run
    }

    fn requires(&self) -> &[&str] {
        &["run.actions.counts_by_type"]
    }

    fn output_schema(&self) -> Value {
        count_schema()
    }

    fn compute(&self, _ctx: &MetricContext<'_>, prior: &JsonObject) -> Result<Value, MetricsError> {
        let total = sum_counts(self.key(), prior, "run.actions.counts_by_type")?;
        Ok(json!(total))
    }
}

/// `run.turns.completed` — number of recorded turns.
#[derive(Debug)]
struct RunTurnsCompleted;

impl Metric for RunTurnsCompleted {
    fn key(&self) -> &str {
        "run.turns.completed"
    }

    fn scope(&self) -> MetricScope {
        MetricScope::Run
    }

    fn output_schema(&self) -> Value {
        count_schema()
    }

    fn compute(&self, ctx: &MetricContext<'_>, _prior: &JsonObject) -> Result<Value, MetricsError> {
        Ok(json!(ctx.run.turns.len()))
    }
}

/// `run.follows.unique_edges` — distinct (follower, followee) pairs.
#[derive(Debug)]
struct RunUniqueFollowEdges;

impl Metric for RunUniqueFollowEdges {
    fn key(&self) -> &str {
        "run.follows.unique_edges"
    }

    fn scope(&self) -> MetricScope {
        MetricScope::Run
    }

    fn output_schema(&self) -> Value {
        count_schema()
    }

    fn compute(&self, ctx: &MetricContext<'_>, _prior: &JsonObject) -> Result<Value, MetricsError> {
        let mut edges: BTreeSet<(&str, &str)> = BTreeSet::new();
        for turn in &ctx.run.turns {
            for (agent, actions) in &turn.actions {
                for accepted in actions {
                    if let Action::Follow { user_id } = &accepted.action {
                        edges.insert((agent.as_str(), user_id.as_str()));
                    }
                }
            }
        }
        Ok(json!(edges.len()))
    }
}
