//! End-to-end runs through scripted collaborators.

use std::collections::HashSet;

use sim::core::history::InMemoryHistoryFactory;
use sim::core::types::{Action, ActionType, RunStatus};
use sim::io::feed::ChronologicalFeed;
use sim::io::generator::{GeneratorRegistry, ProposedAction, default_generator_registry};
use sim::metrics::builtin::default_registry;
use sim::run::run_simulation;
use sim::test_support::{
    RecordingPersistence, ScriptedActionGenerator, echo_registry, run_spec,
};

/// No (agent, action type, target) triple is accepted twice across a run.
#[test]
fn completed_run_never_repeats_actions() {
    let spec = run_spec("run-1", 3);
    let registry = default_registry().expect("registry");
    let persistence = RecordingPersistence::default();

    let outcome = run_simulation(
        &spec,
        &ChronologicalFeed,
        &echo_registry(),
        &registry,
        &persistence,
        &InMemoryHistoryFactory,
    )
    .expect("run");

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.turns_completed, 3);

    let mut seen: HashSet<(String, ActionType, String)> = HashSet::new();
    for turn in persistence.turns.borrow().iter() {
        for (agent, actions) in &turn.actions {
            for accepted in actions {
                let key = (
                    agent.clone(),
                    accepted.action.action_type(),
                    accepted.action.target_id().to_string(),
                );
                assert!(
                    seen.insert(key),
                    "repeated action for '{agent}' in turn {}",
                    turn.turn_number
                );
            }
        }
    }
    assert!(!seen.is_empty());

    // The echo generators exhaust every candidate in turn 0; the guardrail
    // leaves nothing eligible afterwards.
    let turns = persistence.turns.borrow();
    assert!(turns[1].actions.is_empty());
    assert!(turns[2].actions.is_empty());
}

#[test]
fn completed_run_reports_consistent_metrics() {
    let spec = run_spec("run-2", 2);
    let registry = default_registry().expect("registry");
    let persistence = RecordingPersistence::default();

    let outcome = run_simulation(
        &spec,
        &ChronologicalFeed,
        &echo_registry(),
        &registry,
        &persistence,
        &InMemoryHistoryFactory,
    )
    .expect("run");

    let total_accepted: usize = persistence
        .turns
        .borrow()
        .iter()
        .flat_map(|turn| turn.actions.values())
        .map(Vec::len)
        .sum();
    let run_metrics = outcome.run_metrics.expect("run metrics");
    assert_eq!(
        run_metrics["run.actions.total"],
        serde_json::json!(total_accepted)
    );

    // One metrics object per finalized turn, each carrying the closure of
    // the requested turn-scope keys.
    let turn_metrics = persistence.turn_metrics.borrow();
    assert_eq!(turn_metrics.len(), 2);
    for (_, metrics) in turn_metrics.iter() {
        assert!(metrics.contains_key("turn.actions.total"));
        assert!(metrics.contains_key("turn.actions.counts_by_type"));
    }

    let last_run = persistence.runs.borrow().last().cloned().expect("run row");
    assert_eq!(last_run.status, RunStatus::Completed);
    assert!(last_run.completed_at.is_some());
}

/// A persistence failure at turn 1 keeps turn 0 and reports failed status.
#[test]
fn persistence_failure_fails_run_and_keeps_prior_turns() {
    let spec = run_spec("run-3", 3);
    let registry = default_registry().expect("registry");
    let persistence = RecordingPersistence {
        fail_turn_write: Some(1),
        ..Default::default()
    };

    let outcome = run_simulation(
        &spec,
        &ChronologicalFeed,
        &echo_registry(),
        &registry,
        &persistence,
        &InMemoryHistoryFactory,
    )
    .expect("run");

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.turns_completed, 1);
    assert!(outcome.run_metrics.is_none());
    assert!(
        outcome
            .failure
            .as_deref()
            .is_some_and(|reason| reason.contains("storage unavailable"))
    );

    assert_eq!(persistence.turns.borrow().len(), 1);
    assert_eq!(persistence.turn_metrics.borrow().len(), 1);
    assert!(persistence.run_metrics.borrow().is_empty());

    let last_run = persistence.runs.borrow().last().cloned().expect("run row");
    assert_eq!(last_run.status, RunStatus::Failed);
    assert!(last_run.completed_at.is_none());
}

/// Duplicate and already-seen proposals are rejected, never re-accepted.
#[test]
fn scripted_duplicates_are_rejected_across_turns() {
    let spec = run_spec("run-5", 2);
    let registry = default_registry().expect("registry");
    let persistence = RecordingPersistence::default();

    // Alice's like generator stubbornly proposes p1 twice every turn;
    // comment and follow generators propose nothing.
    let mut generators = GeneratorRegistry::new();
    generators.register(
        ActionType::Like,
        "random",
        Box::new(ScriptedActionGenerator::for_agent(
            "alice",
            vec![ProposedAction::target("p1"), ProposedAction::target("p1")],
        )),
    );
    generators.register(
        ActionType::Comment,
        "random",
        Box::new(ScriptedActionGenerator::default()),
    );
    generators.register(
        ActionType::Follow,
        "random",
        Box::new(ScriptedActionGenerator::default()),
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
    assert_eq!(outcome.status, RunStatus::Completed);

    let turns = persistence.turns.borrow();
    // Turn 0: the per-turn dedup keeps exactly one like on p1.
    let alice_turn0 = &turns[0].actions["alice"];
    assert_eq!(alice_turn0.len(), 1);
    assert_eq!(
        alice_turn0[0].action,
        Action::Like {
            post_id: "p1".to_string()
        }
    );
    // Turn 1: the same proposals are rejected against history.
    assert!(!turns[1].actions.contains_key("alice"));
}

/// Identical specs and seeds produce identical persisted turns.
#[test]
fn seeded_runs_are_reproducible() {
    let registry = default_registry().expect("registry");

    let mut turn_sets = Vec::new();
    for _ in 0..2 {
        let spec = run_spec("run-4", 2);
        let persistence = RecordingPersistence::default();
        let outcome = run_simulation(
            &spec,
            &ChronologicalFeed,
            &default_generator_registry(42),
            &registry,
            &persistence,
            &InMemoryHistoryFactory,
        )
        .expect("run");
        assert_eq!(outcome.status, RunStatus::Completed);
        turn_sets.push(persistence.turns.into_inner());
    }

    assert_eq!(turn_sets[0], turn_sets[1]);
}
