//! Commit validated targets into the history store.

use crate::core::history::ActionHistory;
use crate::core::types::ActionType;

/// Record accepted targets for one agent/action-type batch.
///
/// This is the only mutation path into the store during a run. It is not
/// transactional with downstream persistence: if a later durable write
/// fails, the store and the persisted record can diverge.
pub fn record_action_targets(
    history: &mut dyn ActionHistory,
    agent: &str,
    action_type: ActionType,
    accepted: &[String],
) {
    if accepted.is_empty() {
        return;
    }
    history.record_targets(agent, action_type, accepted);
}
