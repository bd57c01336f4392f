//! Test-only helpers: deterministic fixtures and scripted collaborators.

use std::cell::RefCell;
use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::core::types::{
    AcceptedAction, Action, AgentProfile, Post, RunRecord, RunStatus, RunSummary, TurnRecord,
};
use crate::io::generator::{ActionGenerator, GeneratorRegistry, ProposedAction};
use crate::io::persistence::Persistence;
use crate::metrics::metric::{JsonObject, Metric, MetricContext, MetricScope, MetricsError};
use crate::run::RunSpec;

/// Create an agent with just a handle.
pub fn agent(handle: &str) -> AgentProfile {
    AgentProfile {
        handle: handle.to_string(),
        persona: None,
    }
}

/// Create a post with no likes.
pub fn post(id: &str, author: &str, created_turn: i64) -> Post {
    Post {
        id: id.to_string(),
        author: author.to_string(),
        created_turn,
        like_count: 0,
    }
}

/// Create a post with an explicit like count.
pub fn post_with_likes(id: &str, author: &str, created_turn: i64, like_count: u64) -> Post {
    Post {
        like_count,
        ..post(id, author, created_turn)
    }
}

pub fn accepted_like(post_id: &str) -> AcceptedAction {
    AcceptedAction {
        action: Action::Like {
            post_id: post_id.to_string(),
        },
        explanation: None,
        model: None,
    }
}

pub fn accepted_comment(post_id: &str, text: &str) -> AcceptedAction {
    AcceptedAction {
        action: Action::Comment {
            post_id: post_id.to_string(),
            text: text.to_string(),
        },
        explanation: None,
        model: None,
    }
}

pub fn accepted_follow(user_id: &str) -> AcceptedAction {
    AcceptedAction {
        action: Action::Follow {
            user_id: user_id.to_string(),
        },
        explanation: None,
        model: None,
    }
}

/// Create an empty turn record.
pub fn turn_record(turn_number: u32) -> TurnRecord {
    TurnRecord {
        turn_number,
        feeds: BTreeMap::new(),
        actions: BTreeMap::new(),
    }
}

/// Create a run record with no turns and deterministic summary fields.
pub fn empty_run_record(run_id: &str) -> RunRecord {
    RunRecord {
        summary: RunSummary {
            run_id: run_id.to_string(),
            status: RunStatus::Running,
            total_turns: 1,
            total_agents: 0,
            feed_algorithm: "chronological".to_string(),
            metric_keys: Vec::new(),
            completed_at: None,
        },
        turns: Vec::new(),
    }
}

/// Create a two-agent run spec over a small shared post pool.
pub fn run_spec(run_id: &str, total_turns: u32) -> RunSpec {
    RunSpec {
        run_id: run_id.to_string(),
        total_turns,
        agents: vec![agent("alice"), agent("bob")],
        posts: vec![
            post("p1", "bob", 0),
            post("p2", "alice", 0),
            post("p3", "bob", 1),
        ],
        feed_algorithm_id: "chronological".to_string(),
        feed_limit: 10,
        generators: Default::default(),
        metric_keys: vec![
            "run.actions.total".to_string(),
            "turn.actions.total".to_string(),
        ],
        self_follow: Default::default(),
    }
}

/// Generator that proposes every candidate it receives.
///
/// Comment text is always attached so the same double works for all action
/// types.
#[derive(Debug, Default)]
pub struct EchoActionGenerator;

impl EchoActionGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl ActionGenerator for EchoActionGenerator {
    fn generate(&self, candidates: &[String], _agent: &AgentProfile) -> Result<Vec<ProposedAction>> {
        Ok(candidates
            .iter()
            .map(|candidate| {
                ProposedAction::target(candidate.clone())
                    .with_comment(format!("note on {candidate}"))
            })
            .collect())
    }
}

/// Generator that returns a fixed proposal list per agent, every call.
#[derive(Debug, Default)]
pub struct ScriptedActionGenerator {
    proposals_by_agent: BTreeMap<String, Vec<ProposedAction>>,
}

impl ScriptedActionGenerator {
    pub fn new(proposals_by_agent: BTreeMap<String, Vec<ProposedAction>>) -> Self {
        Self { proposals_by_agent }
    }

    pub fn for_agent(handle: &str, proposals: Vec<ProposedAction>) -> Self {
        let mut by_agent = BTreeMap::new();
        by_agent.insert(handle.to_string(), proposals);
        Self::new(by_agent)
    }
}

impl ActionGenerator for ScriptedActionGenerator {
    fn generate(&self, _candidates: &[String], agent: &AgentProfile) -> Result<Vec<ProposedAction>> {
        Ok(self
            .proposals_by_agent
            .get(&agent.handle)
            .cloned()
            .unwrap_or_default())
    }
}

/// Generator that always fails, for run-failure tests.
#[derive(Debug)]
pub struct FailingActionGenerator {
    message: String,
}

impl FailingActionGenerator {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl ActionGenerator for FailingActionGenerator {
    fn generate(&self, _candidates: &[String], _agent: &AgentProfile) -> Result<Vec<ProposedAction>> {
        Err(anyhow!("{}", self.message))
    }
}

/// Registry wiring [`EchoActionGenerator`] as `random` for every type.
pub fn echo_registry() -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    for action_type in crate::core::types::ActionType::ALL {
        registry.register(action_type, "random", Box::new(EchoActionGenerator::new()));
    }
    registry
}

/// In-memory persistence double recording every write in order.
#[derive(Debug, Default)]
pub struct RecordingPersistence {
    pub runs: RefCell<Vec<RunSummary>>,
    pub turns: RefCell<Vec<TurnRecord>>,
    pub turn_metrics: RefCell<Vec<(u32, JsonObject)>>,
    pub run_metrics: RefCell<Vec<JsonObject>>,
    /// When set, `write_turn` fails for this turn number.
    pub fail_turn_write: Option<u32>,
}

impl Persistence for RecordingPersistence {
    fn write_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.borrow_mut().push(run.clone());
        Ok(())
    }

    fn write_turn(&self, _run_id: &str, turn: &TurnRecord) -> Result<()> {
        if self.fail_turn_write == Some(turn.turn_number) {
            return Err(anyhow!("storage unavailable"));
        }
        self.turns.borrow_mut().push(turn.clone());
        Ok(())
    }

    fn write_turn_metrics(
        &self,
        _run_id: &str,
        turn_number: u32,
        metrics: &JsonObject,
    ) -> Result<()> {
        self.turn_metrics
            .borrow_mut()
            .push((turn_number, metrics.clone()));
        Ok(())
    }

    fn write_run_metrics(&self, _run_id: &str, metrics: &JsonObject) -> Result<()> {
        self.run_metrics.borrow_mut().push(metrics.clone());
        Ok(())
    }
}

/// Configurable metric for registry and collector tests.
#[derive(Debug)]
pub struct StaticMetric {
    key: String,
    scope: MetricScope,
    requires: Vec<&'static str>,
    value: Value,
    schema: Value,
    fail: Option<String>,
    echo_prior: bool,
}

/// Create a metric returning `0` with an integer schema.
pub fn static_metric(key: &str, scope: MetricScope, requires: &[&'static str]) -> StaticMetric {
    StaticMetric {
        key: key.to_string(),
        scope,
        requires: requires.to_vec(),
        value: json!(0),
        schema: json!({"type": "integer"}),
        fail: None,
        echo_prior: false,
    }
}

impl StaticMetric {
    pub fn with_output(mut self, value: Value, schema: Value) -> Self {
        self.value = value;
        self.schema = schema;
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.fail = Some(reason.to_string());
        self
    }

    /// Return the prior view as the computed value, for isolation tests.
    pub fn echoing_prior(mut self) -> Self {
        self.echo_prior = true;
        self.schema = json!({"type": "object"});
        self
    }
}

impl Metric for StaticMetric {
    fn key(&self) -> &str {
        &self.key
    }

    fn scope(&self) -> MetricScope {
        self.scope
    }

    fn requires(&self) -> &[&str] {
        &self.requires
    }

    fn output_schema(&self) -> Value {
        self.schema.clone()
    }

    fn compute(&self, _ctx: &MetricContext<'_>, prior: &JsonObject) -> Result<Value, MetricsError> {
        if let Some(reason) = &self.fail {
            return Err(MetricsError::Computation {
                key: self.key.clone(),
                reason: reason.clone(),
            });
        }
        if self.echo_prior {
            return Ok(Value::Object(prior.clone()));
        }
        Ok(self.value.clone())
    }
}
