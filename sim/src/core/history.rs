//! Run-scoped record of targets already acted upon.

use std::collections::{HashMap, HashSet};

use crate::core::types::ActionType;

/// Per-run store of (agent, action type, target) triples accepted so far.
///
/// The store encodes state only; eligibility rules live in
/// [`crate::core::filter`] and [`crate::core::rules`]. One instance exists
/// per run execution, created from an [`ActionHistoryFactory`] at run start
/// and discarded at run end. Not persisted by this layer.
pub trait ActionHistory {
    /// True if `target_id` was already accepted for this agent/action type.
    fn has_target(&self, agent: &str, action_type: ActionType, target_id: &str) -> bool;

    /// Record accepted targets. Re-recording an existing id is a no-op,
    /// never an error.
    fn record_targets(&mut self, agent: &str, action_type: ActionType, target_ids: &[String]);
}

/// Factory seam so a durable store can replace the in-memory one without
/// changing callers.
pub trait ActionHistoryFactory {
    fn create(&self) -> Box<dyn ActionHistory>;
}

/// Default in-memory store.
///
/// Lookup and insertion are O(1). Not documented as safe for concurrent
/// mutation; the orchestrator owns it within one sequential call chain.
#[derive(Debug, Default)]
pub struct InMemoryActionHistory {
    targets: HashMap<String, HashMap<ActionType, HashSet<String>>>,
}

impl InMemoryActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded targets for one agent/action type.
    pub fn target_count(&self, agent: &str, action_type: ActionType) -> usize {
        self.targets
            .get(agent)
            .and_then(|by_type| by_type.get(&action_type))
            .map_or(0, HashSet::len)
    }
}

impl ActionHistory for InMemoryActionHistory {
    fn has_target(&self, agent: &str, action_type: ActionType, target_id: &str) -> bool {
        self.targets
            .get(agent)
            .and_then(|by_type| by_type.get(&action_type))
            .is_some_and(|ids| ids.contains(target_id))
    }

    fn record_targets(&mut self, agent: &str, action_type: ActionType, target_ids: &[String]) {
        let ids = self
            .targets
            .entry(agent.to_string())
            .or_default()
            .entry(action_type)
            .or_default();
        for target_id in target_ids {
            ids.insert(target_id.clone());
        }
    }
}

/// Factory for the default in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryHistoryFactory;

impl ActionHistoryFactory for InMemoryHistoryFactory {
    fn create(&self) -> Box<dyn ActionHistory> {
        Box::new(InMemoryActionHistory::new())
    }
}
