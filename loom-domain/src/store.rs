// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The `Store` port (§4.1): the engine's sole concurrency primitive.
//!
//! `claim` is the gate every worker passes through before running a step;
//! its atomicity is what makes parallel, crash-safe execution correct.
//! Every other operation is a convenience built on top of the same
//! `(key, id)` row space.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PipelineError;
use crate::record::StoreRecord;

/// Optional filters for [`Store::find`]; an absent field widens the match.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub key: Option<String>,
    pub id: Option<String>,
}

impl RecordFilter {
    pub fn by_key(key: impl Into<String>) -> Self {
        Self { key: Some(key.into()), id: None }
    }

    pub fn by_key_and_id(key: impl Into<String>, id: impl Into<String>) -> Self {
        Self { key: Some(key.into()), id: Some(id.into()) }
    }
}

/// Content-addressed key/id store with atomic claim/commit/abort.
///
/// Implementations must make `claim` durable and atomic: concurrent
/// callers racing the same `(key, id)` must see exactly one `Ok(true)`.
/// A unique-index insert failure is the canonical way to provide this
/// without an advisory lock (§9 "Atomic claim").
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert the sentinel row `(key, id, null, null)`.
    ///
    /// Returns `Ok(true)` if this call won the race, `Ok(false)` if the
    /// row already existed in any state. Any other failure propagates as
    /// `Err` and must not be confused with a lost race.
    async fn claim(&self, key: &str, id: &str) -> Result<bool, PipelineError>;

    /// Replace a claimed sentinel with real content. Callers must only
    /// invoke this after a successful `claim`.
    async fn commit(&self, key: &str, id: &str, payload: Value, meta: Value) -> Result<(), PipelineError>;

    /// Delete the row at `(key, id)`, releasing a claim that won't be
    /// committed.
    async fn abort(&self, key: &str, id: &str) -> Result<(), PipelineError>;

    /// Read committed contents. Returns `None` for an absent row or one
    /// still in the claimed state.
    async fn load(&self, key: &str, id: &str) -> Result<Option<(Value, Value)>, PipelineError>;

    /// All rows matching the given filter, committed or claimed.
    async fn find(&self, filter: RecordFilter) -> Result<Vec<StoreRecord>, PipelineError>;

    /// Distinct `key` values present in the store.
    async fn all_keys(&self) -> Result<Vec<String>, PipelineError>;

    /// Distinct `id` values present under `key`.
    async fn all_ids(&self, key: &str) -> Result<Vec<String>, PipelineError>;

    /// Delete claim sentinels at `key` older than `max_age_secs`, ignoring
    /// committed rows. Addresses the "Open question — claim recovery"
    /// design note (§4.3): an implementer-provided startup sweep for
    /// claims orphaned by a crashed worker. Returns the number removed.
    async fn sweep_orphaned_claims(&self, key: &str, max_age_secs: i64) -> Result<u64, PipelineError>;
}
