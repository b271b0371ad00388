// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The one error type that crosses the `Step`/`Store` trait boundary.
//!
//! Infrastructure adapters (the SQLite store, the LLM/image HTTP clients)
//! wrap their own library errors into this type at the adapter seam; domain
//! and application code never see `sqlx::Error` or `reqwest::Error`
//! directly.

use thiserror::Error;

/// Errors that can occur while running a step or talking to the store.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The content store failed in a way that isn't a claim conflict
    /// (claim conflicts are not errors, see [`crate::store::Store::claim`]).
    #[error("store error: {0}")]
    Store(String),

    /// A step's configuration was invalid (missing required parameter,
    /// unknown enum value, ...).
    #[error("validation error in step {step}: {reason}")]
    Validation { step: String, reason: String },

    /// Template rendering failed (malformed `template` syntax).
    #[error("template error in step {step}: {reason}")]
    Template { step: String, reason: String },

    /// The LLM backend request failed (transport error or non-2xx status).
    #[error("llm backend error: {0}")]
    Llm(String),

    /// The image backend request failed.
    #[error("image backend error: {0}")]
    Image(String),

    /// A requested record does not exist.
    #[error("record not found: {key}/{id}")]
    NotFound { key: String, id: String },

    /// Anything that doesn't fit the above and should never happen in
    /// correct Dispatcher code.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn validation(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation { step: step.into(), reason: reason.into() }
    }

    pub fn template(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Template { step: step.into(), reason: reason.into() }
    }
}
