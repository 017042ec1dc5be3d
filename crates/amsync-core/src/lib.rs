//! # amsync-core
//!
//! Shared types, traits, and error model for the amsync ingestion pipeline.
//! This crate has no knowledge of HTTP, ArangoDB, or any specific upstream
//! API — it defines the vocabulary the other crates build on:
//!
//! - **Domain model**: [`ResourceKind`] (the resources the Initial Fill
//!   Engine knows how to populate) and the enums that drive environment
//!   and authentication selection. Lookup entities themselves stay as
//!   `serde_json::Value` throughout the pipeline — AM's payload shape is
//!   too close to the wire to warrant a typed round-trip here.
//! - **Pipeline step state machine**: [`DbStep`], the monotonic marker
//!   persisted in the state store that the Pipeline Controller advances.
//! - **Error taxonomy**: [`PipelineError`], matched on by callers that need
//!   to distinguish retryable connectivity failures from fatal
//!   configuration errors.
//! - **Retry helper**: an indefinite, fixed-backoff retry loop used by the
//!   fill engines around each resource's fetch-transform-write attempt.

pub mod error;
pub mod model;
pub mod retry;

pub use error::PipelineError;
pub use model::*;
pub use retry::retry_forever;
