//! Structured error taxonomy for amsync.
//!
//! Mirrors the shape of `rde_core::RdeError`: a small set of named,
//! matched-on variants plus a transparent catch-all for everything else,
//! so call sites can use `anyhow::Result` throughout while still being able
//! to distinguish "retry this" from "give up" at the few places that care.

use thiserror::Error;

/// Errors raised by amsync's upstream clients, storage adapter, and
/// pipeline engines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Settings file missing, malformed, or missing a required key.
    #[error("configuration error: {0}")]
    Config(String),

    /// The underlying HTTP transport failed before a response was
    /// received (DNS, TLS, connection reset, timeout).
    #[error("connectivity error calling {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A request completed but the upstream API or ArangoDB returned a
    /// non-success status after exhausting the bounded per-request retry
    /// budget.
    #[error("protocol error ({status}) calling {url}: {body}")]
    Protocol {
        url: String,
        status: u16,
        body: String,
    },

    /// The storage adapter failed to execute a collection, import, index,
    /// graph, or query operation against ArangoDB.
    #[error("storage error: {0}")]
    Storage(String),

    /// The Asset Transformer could not produce a valid document from an
    /// upstream record (e.g. unparseable WKT). Whether this is fatal for
    /// the containing page or only for the single asset is governed by
    /// `GeometryErrorPolicy`.
    #[error("transform error: {0}")]
    Transform(String),

    /// Wildcard for anything that doesn't need its own variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Protocol and connectivity errors are the ones the outer
    /// indefinite-retry loop is built to absorb; config errors are not,
    /// since no amount of retrying fixes a bad settings file.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Connectivity { .. } | PipelineError::Protocol { .. } | PipelineError::Storage(_)
        )
    }
}
