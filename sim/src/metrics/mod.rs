//! Metric contract, registry, and dependency-ordered collection.

pub mod builtin;
pub mod collector;
pub mod metric;
pub mod registry;
