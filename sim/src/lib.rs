//! Deterministic multi-agent social simulation core.
//!
//! This crate implements a turn-based simulation where each agent receives a
//! ranked content feed, proposes actions (likes, comments, follows), and a
//! guardrail pipeline filters, validates, and records those actions before
//! metrics are aggregated. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic guardrail logic (action history,
//!   candidate filtering, rule validation, recording). No I/O, fully
//!   testable in isolation.
//! - **[`metrics`]**: Dependency-ordered metric computation with
//!   schema-validated outputs.
//! - **[`io`]**: Collaborator seams (feed ranking, action generation,
//!   persistence, configuration). Isolated to enable scripted test doubles.
//!
//! [`run`] coordinates core logic with collaborators to execute full runs.

pub mod core;
pub mod io;
pub mod logging;
pub mod metrics;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
