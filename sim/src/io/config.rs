//! Run configuration stored as TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::rules::SelfTargetPolicy;
use crate::core::types::{AgentProfile, Post};
use crate::io::generator::GeneratorIds;

/// Run configuration (TOML).
///
/// This file is intended to be edited by humans and validated before
/// anything reaches the core. Metric keys are always explicit: the core
/// never substitutes defaults, so an empty selection is rejected here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Optional run identifier; the driver derives one when absent.
    pub run_id: Option<String>,

    pub total_turns: u32,

    /// Feed algorithm id resolved against the feed registry.
    pub feed_algorithm: String,

    /// Maximum posts per generated feed.
    pub feed_limit: usize,

    /// Seed for the random action generators.
    pub seed: u64,

    pub self_follow: SelfTargetPolicy,

    /// Explicit metric selection: non-empty, sorted, unique.
    pub metric_keys: Vec<String>,

    pub generators: GeneratorIds,

    pub agents: Vec<AgentProfile>,

    /// Seed posts forming the candidate pool.
    pub posts: Vec<Post>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: None,
            total_turns: 1,
            feed_algorithm: "chronological".to_string(),
            feed_limit: 10,
            seed: 0,
            self_follow: SelfTargetPolicy::default(),
            metric_keys: Vec::new(),
            generators: GeneratorIds::default(),
            agents: Vec::new(),
            posts: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.total_turns == 0 {
            return Err(anyhow!("total_turns must be > 0"));
        }
        if self.feed_limit == 0 {
            return Err(anyhow!("feed_limit must be > 0"));
        }
        if self.feed_algorithm.trim().is_empty() {
            return Err(anyhow!("feed_algorithm must not be empty"));
        }
        if self.agents.is_empty() {
            return Err(anyhow!("agents must not be empty"));
        }
        for pair in self.agents.windows(2) {
            if pair[0].handle == pair[1].handle {
                return Err(anyhow!("duplicate agent handle '{}'", pair[0].handle));
            }
        }
        if self.metric_keys.is_empty() {
            return Err(anyhow!("metric_keys must not be empty"));
        }
        for pair in self.metric_keys.windows(2) {
            if pair[0] >= pair[1] {
                return Err(anyhow!("metric_keys must be sorted and unique"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// A missing file is an error: metric keys and agents must always be
/// explicit.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut config: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    // Agent order never carries meaning; normalize before validating.
    config.agents.sort_by(|a, b| a.handle.cmp(&b.handle));
    config.validate()?;
    Ok(config)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, config: &RunConfig) -> Result<()> {
    config.validate()?;
    let mut buf = toml::to_string_pretty(config).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
