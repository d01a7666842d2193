//! Shared artifact relay domain primitives.
//!
//! This crate owns the queue message contract, relay configuration, template
//! detection and bucket reference rewriting. It intentionally excludes AWS SDK,
//! HTTP and Lambda runtime concerns.

pub mod classifier;
pub mod config;
pub mod contract;
pub mod rewrite;
