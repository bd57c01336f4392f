//! Per-turn and cross-turn uniqueness rules for proposed actions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::history::ActionHistory;
use crate::core::types::{ActionType, ValidationSplit};

/// Whether an agent may target itself with a follow.
///
/// The validator contract does not fix this: the composition applies the
/// policy while assembling follow candidates, before validation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfTargetPolicy {
    #[default]
    Reject,
    Allow,
}

impl SelfTargetPolicy {
    /// Apply the policy to a follow-candidate list.
    pub fn apply(self, agent: &str, candidates: Vec<String>) -> Vec<String> {
        match self {
            SelfTargetPolicy::Allow => candidates,
            SelfTargetPolicy::Reject => candidates
                .into_iter()
                .filter(|target_id| target_id != agent)
                .collect(),
        }
    }
}

/// Split `proposed` into accepted and rejected targets, preserving order.
///
/// A target is rejected if it already appeared earlier in this same call
/// (first occurrence wins) or if the store already has it from a prior turn.
/// Everything else is accepted. Pure function of its inputs plus the store's
/// current state: identical inputs always yield identical splits.
pub fn validate_targets(
    history: &dyn ActionHistory,
    agent: &str,
    action_type: ActionType,
    turn_number: u32,
    proposed: &[String],
) -> ValidationSplit {
    let mut split = ValidationSplit::default();
    let mut seen_this_call = HashSet::new();

    for target_id in proposed {
        let duplicate = !seen_this_call.insert(target_id.as_str());
        if duplicate || history.has_target(agent, action_type, target_id) {
            split.rejected.push(target_id.clone());
        } else {
            split.accepted.push(target_id.clone());
        }
    }

    debug!(
        agent,
        action_type = action_type.label(),
        turn = turn_number,
        accepted = split.accepted.len(),
        rejected = split.rejected.len(),
        "validated proposed targets"
    );
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::InMemoryActionHistory;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    /// Intra-call duplicates: first occurrence wins, later ones are rejected.
    #[test]
    fn validate_rejects_duplicates_within_one_call() {
        let store = InMemoryActionHistory::new();
        let split = validate_targets(&store, "alice", ActionType::Like, 0, &ids(&["p2", "p2", "p4"]));

        assert_eq!(split.accepted, ids(&["p2", "p4"]));
        assert_eq!(split.rejected, ids(&["p2"]));
    }

    /// Targets recorded in a prior turn are rejected (cross-turn no-repeat).
    #[test]
    fn validate_rejects_targets_from_history() {
        let mut store = InMemoryActionHistory::new();
        store.record_targets("alice", ActionType::Like, &ids(&["p1"]));

        let split = validate_targets(&store, "alice", ActionType::Like, 1, &ids(&["p1", "p2"]));
        assert_eq!(split.accepted, ids(&["p2"]));
        assert_eq!(split.rejected, ids(&["p1"]));
    }

    /// Identical inputs and store state yield identical splits.
    #[test]
    fn validate_is_deterministic() {
        let mut store = InMemoryActionHistory::new();
        store.record_targets("alice", ActionType::Comment, &ids(&["p9"]));
        let proposed = ids(&["p9", "p3", "p3", "p7"]);

        let first = validate_targets(&store, "alice", ActionType::Comment, 2, &proposed);
        let second = validate_targets(&store, "alice", ActionType::Comment, 2, &proposed);
        assert_eq!(first, second);
    }

    #[test]
    fn validate_accepts_everything_when_clean() {
        let store = InMemoryActionHistory::new();
        let split = validate_targets(&store, "alice", ActionType::Follow, 0, &ids(&["bob", "carol"]));

        assert_eq!(split.accepted, ids(&["bob", "carol"]));
        assert!(split.rejected.is_empty());
    }

    #[test]
    fn self_target_policy_reject_strips_own_handle() {
        let candidates = ids(&["bob", "alice", "carol"]);
        let kept = SelfTargetPolicy::Reject.apply("alice", candidates);
        assert_eq!(kept, ids(&["bob", "carol"]));
    }

    #[test]
    fn self_target_policy_allow_keeps_own_handle() {
        let candidates = ids(&["bob", "alice"]);
        let kept = SelfTargetPolicy::Allow.apply("alice", candidates.clone());
        assert_eq!(kept, candidates);
    }
}
