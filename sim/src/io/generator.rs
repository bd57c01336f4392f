//! Action proposal seam and the seeded random generator.
//!
//! LLM-backed generators live outside this crate and implement the same
//! trait; the core neither retries nor partially accepts their output.

use std::collections::BTreeMap;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::types::{ActionType, AgentProfile};

/// A target proposed by a generator, with optional payload and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedAction {
    pub target_id: String,
    /// Comment body; required when proposing comments.
    pub comment_text: Option<String>,
    pub explanation: Option<String>,
    pub model: Option<String>,
}

impl ProposedAction {
    pub fn target(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            comment_text: None,
            explanation: None,
            model: None,
        }
    }

    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comment_text = Some(text.into());
        self
    }
}

/// Produces proposed targets from filtered candidates.
///
/// May fail (e.g. provider errors); a generator failure fails the whole run.
pub trait ActionGenerator {
    fn generate(&self, candidates: &[String], agent: &AgentProfile) -> Result<Vec<ProposedAction>>;
}

/// Generator algorithm ids per action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorIds {
    pub like: String,
    pub comment: String,
    pub follow: String,
}

impl Default for GeneratorIds {
    fn default() -> Self {
        Self {
            like: "random".to_string(),
            comment: "random".to_string(),
            follow: "random".to_string(),
        }
    }
}

impl GeneratorIds {
    pub fn for_type(&self, action_type: ActionType) -> &str {
        match action_type {
            ActionType::Like => &self.like,
            ActionType::Comment => &self.comment,
            ActionType::Follow => &self.follow,
        }
    }
}

/// Catalog keyed by (action type, algorithm id).
///
/// Resolved once at composition time; the orchestrator holds resolved
/// references for the whole run.
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<(ActionType, String), Box<dyn ActionGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        action_type: ActionType,
        id: impl Into<String>,
        generator: Box<dyn ActionGenerator>,
    ) {
        self.generators.insert((action_type, id.into()), generator);
    }

    pub fn get(&self, action_type: ActionType, id: &str) -> Option<&dyn ActionGenerator> {
        self.generators
            .get(&(action_type, id.to_string()))
            .map(Box::as_ref)
    }

    pub fn contains(&self, action_type: ActionType, id: &str) -> bool {
        self.generators.contains_key(&(action_type, id.to_string()))
    }
}

/// Registry with a seeded `random` generator for every action type.
pub fn default_generator_registry(seed: u64) -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    for action_type in ActionType::ALL {
        registry.register(
            action_type,
            "random",
            Box::new(RandomActionGenerator::new(action_type, seed, 0.4)),
        );
    }
    registry
}

/// Seeded pseudo-random generator.
///
/// Proposes each candidate independently with a fixed probability. The
/// random stream is derived from (seed, action type, agent handle,
/// candidate list), so identical inputs always yield identical proposals
/// and runs stay reproducible.
pub struct RandomActionGenerator {
    action_type: ActionType,
    seed: u64,
    rate: f64,
}

impl RandomActionGenerator {
    pub fn new(action_type: ActionType, seed: u64, rate: f64) -> Self {
        Self {
            action_type,
            seed,
            rate: rate.clamp(0.0, 1.0),
        }
    }

    fn rng_for(&self, agent: &AgentProfile, candidates: &[String]) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(self.action_type.label().as_bytes());
        hasher.update(agent.handle.as_bytes());
        for candidate in candidates {
            hasher.update([0]);
            hasher.update(candidate.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(bytes))
    }
}

impl ActionGenerator for RandomActionGenerator {
    fn generate(&self, candidates: &[String], agent: &AgentProfile) -> Result<Vec<ProposedAction>> {
        let mut rng = self.rng_for(agent, candidates);
        let mut proposals = Vec::new();
        for candidate in candidates {
            if !rng.gen_bool(self.rate) {
                continue;
            }
            let mut proposal = ProposedAction::target(candidate.clone());
            if self.action_type == ActionType::Comment {
                proposal = proposal.with_comment(format!("Interesting take on {candidate}"));
            }
            proposals.push(proposal);
        }
        Ok(proposals)
    }
}
