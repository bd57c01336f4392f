//! Orchestration of a full simulation run.
//!
//! `run_simulation` sequences the guardrail pipeline per agent per turn,
//! then hands the recorded run to the metrics collector. Everything is
//! single-threaded and synchronous: turn N+1 cannot start before turn N is
//! finalized, because filtering and validation depend on cumulative history
//! state. Collaborators are injected by reference and may fail; any such
//! failure transitions the run to `failed`, retaining completed turns.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::filter::filter_candidates;
use crate::core::history::{ActionHistory, ActionHistoryFactory};
use crate::core::recorder::record_action_targets;
use crate::core::rules::{SelfTargetPolicy, validate_targets};
use crate::core::types::{
    AcceptedAction, Action, ActionType, AgentProfile, Post, RunRecord, RunStatus, RunSummary,
    TurnRecord, ValidationSplit,
};
use crate::io::feed::FeedAlgorithm;
use crate::io::generator::{ActionGenerator, GeneratorIds, GeneratorRegistry, ProposedAction};
use crate::io::persistence::Persistence;
use crate::metrics::collector::MetricsCollector;
use crate::metrics::metric::JsonObject;
use crate::metrics::registry::MetricsRegistry;

/// Everything a run needs beyond its injected collaborators.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub run_id: String,
    pub total_turns: u32,
    pub agents: Vec<AgentProfile>,
    /// Candidate pool the feed algorithm ranks each turn.
    pub posts: Vec<Post>,
    /// Id recorded in the run summary; the resolved algorithm is injected.
    pub feed_algorithm_id: String,
    pub feed_limit: usize,
    pub generators: GeneratorIds,
    /// Explicit metric selection; never defaulted here.
    pub metric_keys: Vec<String>,
    pub self_follow: SelfTargetPolicy,
}

impl RunSpec {
    pub fn from_config(config: &crate::io::config::RunConfig, run_id: String) -> Self {
        Self {
            run_id,
            total_turns: config.total_turns,
            agents: config.agents.clone(),
            posts: config.posts.clone(),
            feed_algorithm_id: config.feed_algorithm.clone(),
            feed_limit: config.feed_limit,
            generators: config.generators.clone(),
            metric_keys: config.metric_keys.clone(),
            self_follow: config.self_follow,
        }
    }
}

/// Final state of a run as reported to the caller.
///
/// Failure is reported as data: completed turns stay persisted, no further
/// turns execute, and no metrics object exists for the incomplete turn.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// Turns fully finalized, including their metrics.
    pub turns_completed: u32,
    pub run_metrics: Option<JsonObject>,
    /// Present iff status is failed.
    pub failure: Option<String>,
}

/// Execute a complete run against the injected collaborators.
///
/// Configuration problems (empty metric selection, unknown metric or
/// generator ids) surface as errors before the run starts. Once the run is
/// underway, collaborator and metrics failures are reported through
/// [`RunOutcome`] with `status = failed`.
pub fn run_simulation(
    spec: &RunSpec,
    feed: &dyn FeedAlgorithm,
    generators: &GeneratorRegistry,
    registry: &MetricsRegistry,
    persistence: &dyn Persistence,
    history_factory: &dyn ActionHistoryFactory,
) -> Result<RunOutcome> {
    if spec.total_turns == 0 {
        return Err(anyhow!("total_turns must be > 0"));
    }
    if spec.agents.is_empty() {
        return Err(anyhow!("agents must not be empty"));
    }
    if spec.metric_keys.is_empty() {
        return Err(anyhow!("metric_keys must not be empty"));
    }

    let (turn_keys, run_keys) = registry
        .partition_by_scope(&spec.metric_keys)
        .context("resolve metric keys")?;

    let mut resolved: BTreeMap<ActionType, &dyn ActionGenerator> = BTreeMap::new();
    for action_type in ActionType::ALL {
        let id = spec.generators.for_type(action_type);
        let generator = generators
            .get(action_type, id)
            .ok_or_else(|| anyhow!("unknown {} generator '{id}'", action_type.label()))?;
        resolved.insert(action_type, generator);
    }

    // Agents are processed in sorted-handle order so identical specs yield
    // identical runs.
    let mut agents = spec.agents.clone();
    agents.sort_by(|a, b| a.handle.cmp(&b.handle));

    let mut summary = RunSummary {
        run_id: spec.run_id.clone(),
        status: RunStatus::Running,
        total_turns: spec.total_turns,
        total_agents: agents.len() as u32,
        feed_algorithm: spec.feed_algorithm_id.clone(),
        metric_keys: spec.metric_keys.clone(),
        completed_at: None,
    };
    persistence.write_run(&summary).context("persist run start")?;
    info!(run_id = %summary.run_id, turns = spec.total_turns, agents = agents.len(), "run started");

    // Exactly one history store per run, owned by this call chain.
    let mut history = history_factory.create();
    let mut run_record = RunRecord {
        summary: summary.clone(),
        turns: Vec::new(),
    };
    let collector = MetricsCollector::new(registry);

    let mut turns_completed = 0u32;
    let mut failure: Option<String> = None;

    for turn_number in 0..spec.total_turns {
        let turn = match execute_turn(spec, turn_number, &agents, feed, &resolved, history.as_mut())
        {
            Ok(turn) => turn,
            Err(err) => {
                failure = Some(format!("turn {turn_number}: {err:#}"));
                break;
            }
        };
        if let Err(err) = persistence.write_turn(&spec.run_id, &turn) {
            failure = Some(format!("turn {turn_number}: {err:#}"));
            break;
        }
        run_record.turns.push(turn);

        match collector.collect_turn_metrics(&run_record, turn_number, &turn_keys) {
            Ok(metrics) => {
                if let Err(err) = persistence.write_turn_metrics(&spec.run_id, turn_number, &metrics)
                {
                    failure = Some(format!("turn {turn_number} metrics: {err:#}"));
                    break;
                }
            }
            Err(err) => {
                failure = Some(format!("turn {turn_number} metrics: {err}"));
                break;
            }
        }
        turns_completed += 1;
        debug!(turn = turn_number, "turn finalized");
    }

    let mut run_metrics = None;
    if failure.is_none() {
        match collector.collect_run_metrics(&run_record, &run_keys) {
            Ok(metrics) => match persistence.write_run_metrics(&spec.run_id, &metrics) {
                Ok(()) => run_metrics = Some(metrics),
                Err(err) => failure = Some(format!("run metrics: {err:#}")),
            },
            Err(err) => failure = Some(format!("run metrics: {err}")),
        }
    }

    if let Some(reason) = failure {
        warn!(run_id = %summary.run_id, %reason, "run failed");
        summary.status = RunStatus::Failed;
        persistence
            .write_run(&summary)
            .context("persist failed run status")?;
        return Ok(RunOutcome {
            run_id: summary.run_id,
            status: RunStatus::Failed,
            turns_completed,
            run_metrics: None,
            failure: Some(reason),
        });
    }

    summary.status = RunStatus::Completed;
    summary.completed_at = Some(Utc::now().to_rfc3339());
    persistence
        .write_run(&summary)
        .context("persist completed run status")?;
    info!(run_id = %summary.run_id, turns_completed, "run completed");
    Ok(RunOutcome {
        run_id: summary.run_id,
        status: RunStatus::Completed,
        turns_completed,
        run_metrics,
        failure: None,
    })
}

/// Run the guardrail pipeline for every agent in one turn.
fn execute_turn(
    spec: &RunSpec,
    turn_number: u32,
    agents: &[AgentProfile],
    feed: &dyn FeedAlgorithm,
    generators: &BTreeMap<ActionType, &dyn ActionGenerator>,
    history: &mut dyn ActionHistory,
) -> Result<TurnRecord> {
    let mut feeds = BTreeMap::new();
    for agent in agents {
        let ranked = feed
            .generate(&spec.posts, agent, spec.feed_limit)
            .with_context(|| format!("generate feed for '{}'", agent.handle))?;
        feeds.insert(agent.handle.clone(), ranked);
    }

    let mut actions: BTreeMap<String, Vec<AcceptedAction>> = BTreeMap::new();
    for agent in agents {
        let feed_ids = &feeds[&agent.handle];
        let mut agent_actions = Vec::new();

        for action_type in ActionType::ALL {
            let candidates =
                candidates_for(action_type, agent, feed_ids, &spec.posts, spec.self_follow);
            let eligible = filter_candidates(history, &agent.handle, action_type, &candidates);
            if eligible.is_empty() {
                // No eligible candidates: skip generation for this agent/type.
                continue;
            }

            let proposals = generators[&action_type]
                .generate(&eligible, agent)
                .with_context(|| {
                    format!("{} generation for '{}'", action_type.label(), agent.handle)
                })?;
            if proposals.is_empty() {
                continue;
            }

            let proposed: Vec<String> = proposals
                .iter()
                .map(|proposal| proposal.target_id.clone())
                .collect();
            let split = validate_targets(history, &agent.handle, action_type, turn_number, &proposed);
            record_action_targets(history, &agent.handle, action_type, &split.accepted);
            agent_actions.extend(accepted_actions(action_type, &proposals, &split)?);
        }

        if !agent_actions.is_empty() {
            actions.insert(agent.handle.clone(), agent_actions);
        }
    }

    Ok(TurnRecord {
        turn_number,
        feeds,
        actions,
    })
}

/// Candidate targets for one agent/action type.
///
/// Likes and comments target feed posts; follows target the authors of feed
/// posts, with the self-target policy applied before validation.
fn candidates_for(
    action_type: ActionType,
    agent: &AgentProfile,
    feed_ids: &[String],
    posts: &[Post],
    self_follow: SelfTargetPolicy,
) -> Vec<String> {
    match action_type {
        ActionType::Like | ActionType::Comment => feed_ids.to_vec(),
        ActionType::Follow => self_follow.apply(&agent.handle, follow_candidates(feed_ids, posts)),
    }
}

/// Authors of the feed's posts, deduplicated in first-appearance order.
fn follow_candidates(feed_ids: &[String], posts: &[Post]) -> Vec<String> {
    let by_id: HashMap<&str, &Post> = posts.iter().map(|post| (post.id.as_str(), post)).collect();
    let mut seen = HashSet::new();
    let mut authors = Vec::new();
    for post_id in feed_ids {
        if let Some(post) = by_id.get(post_id.as_str()) {
            if seen.insert(post.author.as_str()) {
                authors.push(post.author.clone());
            }
        }
    }
    authors
}

/// Pair accepted targets back with their proposal payloads, in order.
fn accepted_actions(
    action_type: ActionType,
    proposals: &[ProposedAction],
    split: &ValidationSplit,
) -> Result<Vec<AcceptedAction>> {
    let mut pending: BTreeSet<&str> = split.accepted.iter().map(String::as_str).collect();
    let mut accepted = Vec::new();
    for proposal in proposals {
        if !pending.remove(proposal.target_id.as_str()) {
            continue;
        }
        accepted.push(AcceptedAction {
            action: make_action(action_type, proposal)?,
            explanation: proposal.explanation.clone(),
            model: proposal.model.clone(),
        });
    }
    Ok(accepted)
}

fn make_action(action_type: ActionType, proposal: &ProposedAction) -> Result<Action> {
    match action_type {
        ActionType::Like => Ok(Action::Like {
            post_id: proposal.target_id.clone(),
        }),
        ActionType::Comment => {
            let text = proposal.comment_text.clone().ok_or_else(|| {
                anyhow!("comment proposal for '{}' missing text", proposal.target_id)
            })?;
            Ok(Action::Comment {
                post_id: proposal.target_id.clone(),
                text,
            })
        }
        ActionType::Follow => Ok(Action::Follow {
            user_id: proposal.target_id.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::InMemoryHistoryFactory;
    use crate::io::feed::ChronologicalFeed;
    use crate::metrics::builtin::default_registry;
    use crate::test_support::{
        EchoActionGenerator, FailingActionGenerator, RecordingPersistence, agent, echo_registry,
        post, run_spec,
    };

    #[test]
    fn run_fails_fast_on_unknown_generator_id() {
        let mut spec = run_spec("run-1", 1);
        spec.generators.like = "llm".to_string();
        let registry = default_registry().expect("registry");
        let persistence = RecordingPersistence::default();

        let err = run_simulation(
            &spec,
            &ChronologicalFeed,
            &echo_registry(),
            &registry,
            &persistence,
            &InMemoryHistoryFactory,
        )
        .expect_err("expected error");
        assert!(err.to_string().contains("unknown like generator 'llm'"));
        // Nothing was persisted: the run never started.
        assert!(persistence.runs.borrow().is_empty());
    }

    #[test]
    fn run_fails_fast_on_unknown_metric_key() {
        let mut spec = run_spec("run-1", 1);
        spec.metric_keys = vec!["no.such.metric".to_string()];
        let registry = default_registry().expect("registry");
        let persistence = RecordingPersistence::default();

        let err = run_simulation(
            &spec,
            &ChronologicalFeed,
            &echo_registry(),
            &registry,
            &persistence,
            &InMemoryHistoryFactory,
        )
        .expect_err("expected error");
        assert!(format!("{err:#}").contains("no.such.metric"));
    }

    /// A generator failure mid-run fails the run but keeps earlier turns.
    #[test]
    fn generator_failure_marks_run_failed_and_keeps_turns() {
        let spec = run_spec("run-1", 3);
        let registry = default_registry().expect("registry");
        let persistence = RecordingPersistence::default();

        let mut generators = GeneratorRegistry::new();
        generators.register(ActionType::Like, "random", Box::new(EchoActionGenerator::new()));
        generators.register(ActionType::Comment, "random", Box::new(EchoActionGenerator::new()));
        generators.register(
            ActionType::Follow,
            "random",
            Box::new(FailingActionGenerator::new("provider unavailable")),
        );

        let outcome = run_simulation(
            &spec,
            &ChronologicalFeed,
            &generators,
            &registry,
            &persistence,
            &InMemoryHistoryFactory,
        )
        .expect("run");

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.turns_completed, 0);
        assert!(outcome.run_metrics.is_none());
        assert!(
            outcome
                .failure
                .as_deref()
                .is_some_and(|reason| reason.contains("provider unavailable"))
        );
        let last = persistence.runs.borrow().last().cloned().expect("run row");
        assert_eq!(last.status, RunStatus::Failed);
        assert!(last.completed_at.is_none());
    }

    #[test]
    fn follow_candidates_deduplicate_authors_in_feed_order() {
        let posts = vec![
            post("p1", "bob", 0),
            post("p2", "carol", 0),
            post("p3", "bob", 0),
        ];
        let feed_ids = vec!["p1".to_string(), "p2".to_string(), "p3".to_string()];
        assert_eq!(
            follow_candidates(&feed_ids, &posts),
            vec!["bob".to_string(), "carol".to_string()]
        );
    }

    #[test]
    fn comment_without_text_is_a_contract_violation() {
        let proposal = ProposedAction::target("p1");
        let err = make_action(ActionType::Comment, &proposal).expect_err("expected error");
        assert!(err.to_string().contains("missing text"));
    }

    /// Self-follow policy strips the acting agent before validation.
    #[test]
    fn candidates_for_follow_respect_self_target_policy() {
        let posts = vec![post("p1", "alice", 0), post("p2", "bob", 0)];
        let feed_ids = vec!["p1".to_string(), "p2".to_string()];

        let rejected = candidates_for(
            ActionType::Follow,
            &agent("alice"),
            &feed_ids,
            &posts,
            SelfTargetPolicy::Reject,
        );
        assert_eq!(rejected, vec!["bob".to_string()]);

        let allowed = candidates_for(
            ActionType::Follow,
            &agent("alice"),
            &feed_ids,
            &posts,
            SelfTargetPolicy::Allow,
        );
        assert_eq!(allowed, vec!["alice".to_string(), "bob".to_string()]);
    }
}
