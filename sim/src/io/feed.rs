//! Feed ranking seam and deterministic built-in algorithms.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::core::types::{AgentProfile, Post};

/// Ranks candidate posts into an ordered feed for one agent.
///
/// Implementations must be deterministic with explicit tie-breaking; the
/// core does not verify this.
pub trait FeedAlgorithm {
    fn generate(&self, posts: &[Post], agent: &AgentProfile, limit: usize) -> Result<Vec<String>>;
}

/// String-id catalog of feed strategies.
///
/// Resolved once at composition time and injected by reference; business
/// logic never looks strategies up ad hoc.
#[derive(Default)]
pub struct FeedRegistry {
    algorithms: BTreeMap<String, Box<dyn FeedAlgorithm>>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, algorithm: Box<dyn FeedAlgorithm>) {
        self.algorithms.insert(id.into(), algorithm);
    }

    pub fn get(&self, id: &str) -> Option<&dyn FeedAlgorithm> {
        self.algorithms.get(id).map(Box::as_ref)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.algorithms.contains_key(id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.algorithms.keys().map(String::as_str)
    }
}

/// Registry holding the built-in algorithms.
pub fn default_feed_registry() -> FeedRegistry {
    let mut registry = FeedRegistry::new();
    registry.register("chronological", Box::new(ChronologicalFeed));
    registry.register("engagement", Box::new(EngagementFeed));
    registry
}

/// Posts authored by the agent itself never appear in its own feed.
fn candidate_pool<'a>(posts: &'a [Post], agent: &AgentProfile) -> Vec<&'a Post> {
    posts.iter().filter(|post| post.author != agent.handle).collect()
}

/// Newest posts first; ties broken by ascending post id.
pub struct ChronologicalFeed;

impl FeedAlgorithm for ChronologicalFeed {
    fn generate(&self, posts: &[Post], agent: &AgentProfile, limit: usize) -> Result<Vec<String>> {
        let mut ranked = candidate_pool(posts, agent);
        ranked.sort_by(|a, b| {
            b.created_turn
                .cmp(&a.created_turn)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(ranked.into_iter().take(limit).map(|post| post.id.clone()).collect())
    }
}

/// Most-liked posts first; ties broken by ascending post id.
pub struct EngagementFeed;

impl FeedAlgorithm for EngagementFeed {
    fn generate(&self, posts: &[Post], agent: &AgentProfile, limit: usize) -> Result<Vec<String>> {
        let mut ranked = candidate_pool(posts, agent);
        ranked.sort_by(|a, b| {
            b.like_count
                .cmp(&a.like_count)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(ranked.into_iter().take(limit).map(|post| post.id.clone()).collect())
    }
}
