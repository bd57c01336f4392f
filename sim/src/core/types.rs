//! Shared deterministic types for the simulation core.
//!
//! These types define stable contracts between core components. They should
//! not depend on external state or I/O and must remain deterministic across
//! runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The three action kinds an agent may take in a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Like,
    Comment,
    Follow,
}

impl ActionType {
    /// Fixed processing order for action types within a turn.
    pub const ALL: [ActionType; 3] = [ActionType::Like, ActionType::Comment, ActionType::Follow];

    pub fn label(self) -> &'static str {
        match self {
            ActionType::Like => "like",
            ActionType::Comment => "comment",
            ActionType::Follow => "follow",
        }
    }
}

/// A validated agent action, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Like { post_id: String },
    Comment { post_id: String, text: String },
    Follow { user_id: String },
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Action::Like { .. } => ActionType::Like,
            Action::Comment { .. } => ActionType::Comment,
            Action::Follow { .. } => ActionType::Follow,
        }
    }

    /// The post or user id this action targets.
    pub fn target_id(&self) -> &str {
        match self {
            Action::Like { post_id } | Action::Comment { post_id, .. } => post_id,
            Action::Follow { user_id } => user_id,
        }
    }
}

/// An accepted action together with optional generator metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedAction {
    #[serde(flatten)]
    pub action: Action,
    /// Rationale attached by an algorithmic generator, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Model identifier when the action was generated by an LLM backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Lifecycle status of a run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Result of rule validation for one agent/action-type batch.
///
/// Rejections are ordinary data, not errors: the turn proceeds with the
/// accepted subset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSplit {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

/// A post in the candidate pool that feed algorithms rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    /// Handle of the authoring agent.
    pub author: String,
    pub created_turn: i64,
    #[serde(default)]
    pub like_count: u64,
}

/// An agent participating in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub handle: String,
    #[serde(default)]
    pub persona: Option<String>,
}

/// One completed turn. Immutable once persisted.
///
/// Maps are keyed by agent handle; `BTreeMap` keeps serialized output
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_number: u32,
    /// Ranked feed (ordered candidate post ids) per agent.
    pub feeds: BTreeMap<String, Vec<String>>,
    /// Accepted actions per agent. Agents without actions are omitted.
    pub actions: BTreeMap<String, Vec<AcceptedAction>>,
}

/// Summary row for a run; `completed_at` is set iff status is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub total_turns: u32,
    pub total_agents: u32,
    pub feed_algorithm: String,
    /// Explicit metric selection for this run; never defaulted by the core.
    pub metric_keys: Vec<String>,
    pub completed_at: Option<String>,
}

/// In-memory record of a run, consumed by metric computations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub summary: RunSummary,
    pub turns: Vec<TurnRecord>,
}

impl RunRecord {
    pub fn turn(&self, turn_number: u32) -> Option<&TurnRecord> {
        self.turns.iter().find(|turn| turn.turn_number == turn_number)
    }
}
