//! Candidate narrowing against the action history.

use crate::core::history::ActionHistory;
use crate::core::types::ActionType;

/// Keep candidates the agent has not yet acted on, preserving input order.
///
/// The output is always an order-preserving subsequence of `candidates`
/// (stable filter, not a re-sort). An empty result means "no eligible
/// candidates": callers skip action generation for this agent/type in the
/// current turn. Never an error.
pub fn filter_candidates(
    history: &dyn ActionHistory,
    agent: &str,
    action_type: ActionType,
    candidates: &[String],
) -> Vec<String> {
    candidates
        .iter()
        .filter(|target_id| !history.has_target(agent, action_type, target_id))
        .cloned()
        .collect()
}
