//! AWS-oriented adapters and handlers for the artifact relay.
//!
//! This crate owns runtime integration details (Lambda handlers, HTTP fetching,
//! bucket adapters and custom resource responses) and exposes a single runtime
//! module boundary for the contract, configuration, classifier and rewrite
//! primitives.

pub mod adapters;
pub mod handlers;
pub mod logging;
pub mod runtime;
