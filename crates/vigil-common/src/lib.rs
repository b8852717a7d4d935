//! Shared data model for the vigil alerting engine.
//!
//! Rules, queries, windows and evaluation results are defined here so that
//! the backend plugins, the shard manager and the worker all agree on one
//! vocabulary. Everything is plain serde-serializable data; behavior lives
//! in the other crates.

pub mod id;
pub mod types;
