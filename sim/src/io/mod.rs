//! Collaborator seams for the simulation core.
//!
//! Everything here is consumed by the orchestrator through narrow traits so
//! tests can substitute scripted implementations.

pub mod config;
pub mod feed;
pub mod generator;
pub mod persistence;
