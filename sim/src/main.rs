//! Multi-agent social simulation driver.
//!
//! Loads a TOML run configuration, wires the built-in feed, generator, and
//! metric registries in one place, and executes runs whose artifacts land
//! under the output directory.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};

use sim::core::history::InMemoryHistoryFactory;
use sim::core::types::{ActionType, RunStatus};
use sim::io::config::{RunConfig, load_config};
use sim::io::feed::default_feed_registry;
use sim::io::generator::default_generator_registry;
use sim::io::persistence::JsonDirPersistence;
use sim::logging;
use sim::metrics::builtin::default_registry;
use sim::metrics::metric::MetricScope;
use sim::run::{RunSpec, run_simulation};

#[derive(Parser)]
#[command(
    name = "sim",
    version,
    about = "Deterministic multi-agent social simulation runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a run config against the metric catalog and registries.
    Validate {
        #[arg(short, long, default_value = "sim.toml")]
        config: PathBuf,
    },
    /// List registered metrics with scope and dependencies.
    Metrics,
    /// Execute a run and write artifacts under the output directory.
    Run {
        #[arg(short, long, default_value = "sim.toml")]
        config: PathBuf,
        /// Output directory for run artifacts (`<out>/runs/<run_id>/`).
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Validate { config } => cmd_validate(&config),
        Command::Metrics => cmd_metrics(),
        Command::Run { config, out } => cmd_run(&config, &out),
    }
}

fn cmd_validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let registry = default_registry()?;
    let (turn_keys, run_keys) = registry.partition_by_scope(&config.metric_keys)?;
    registry.resolve(MetricScope::Turn, &turn_keys)?;
    registry.resolve(MetricScope::Run, &run_keys)?;
    resolve_collaborators(&config)?;
    println!(
        "ok: {} agents, {} turns, {} metric keys",
        config.agents.len(),
        config.total_turns,
        config.metric_keys.len()
    );
    Ok(())
}

fn cmd_metrics() -> Result<()> {
    let registry = default_registry()?;
    for key in registry.keys().collect::<Vec<_>>() {
        let Some(metric) = registry.get(key) else {
            continue;
        };
        let requires = metric.requires();
        if requires.is_empty() {
            println!("{key}  [{}]", metric.scope().label());
        } else {
            println!(
                "{key}  [{}]  requires: {}",
                metric.scope().label(),
                requires.join(", ")
            );
        }
    }
    Ok(())
}

fn cmd_run(config_path: &Path, out: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    resolve_collaborators(&config)?;
    let registry = default_registry()?;

    let feeds = default_feed_registry();
    let feed = feeds
        .get(&config.feed_algorithm)
        .ok_or_else(|| anyhow!("unknown feed algorithm '{}'", config.feed_algorithm))?;
    let generators = default_generator_registry(config.seed);
    let persistence = JsonDirPersistence::new(out);

    let run_id = config
        .run_id
        .clone()
        .unwrap_or_else(|| format!("run-{}", Utc::now().format("%Y%m%d_%H%M%S")));
    let spec = RunSpec::from_config(&config, run_id);

    let outcome = run_simulation(
        &spec,
        feed,
        &generators,
        &registry,
        &persistence,
        &InMemoryHistoryFactory,
    )?;
    match outcome.status {
        RunStatus::Completed => {
            println!(
                "run {} completed: {} turns, {} run metrics",
                outcome.run_id,
                outcome.turns_completed,
                outcome.run_metrics.as_ref().map_or(0, |metrics| metrics.len())
            );
            Ok(())
        }
        RunStatus::Failed => Err(anyhow!(
            "run {} failed after {} completed turns: {}",
            outcome.run_id,
            outcome.turns_completed,
            outcome.failure.unwrap_or_default()
        )),
        RunStatus::Running => Err(anyhow!("run {} did not reach a terminal state", outcome.run_id)),
    }
}

fn resolve_collaborators(config: &RunConfig) -> Result<()> {
    let feeds = default_feed_registry();
    if !feeds.contains(&config.feed_algorithm) {
        return Err(anyhow!(
            "unknown feed algorithm '{}' (available: {})",
            config.feed_algorithm,
            feeds.ids().collect::<Vec<_>>().join(", ")
        ));
    }
    let generators = default_generator_registry(config.seed);
    for action_type in ActionType::ALL {
        let id = config.generators.for_type(action_type);
        if !generators.contains(action_type, id) {
            return Err(anyhow!("unknown {} generator '{id}'", action_type.label()));
        }
    }
    Ok(())
}
