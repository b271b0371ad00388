// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The `Step` port: a unit of computation with one optional input key and
//! one output key. The Dispatcher never knows what a step does, only how to
//! ask it for pending work and how to run it on a single input.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PipelineError;
use crate::params::StepParams;
use crate::record::RecordState;
use crate::store::{RecordFilter, Store};

/// One `(id, input_payload)` tuple a step is ready to produce output for.
/// `input` is `None` for generator steps, which have no `inkey`.
#[derive(Debug, Clone)]
pub struct PendingInput {
    pub id: String,
    pub input: Option<Value>,
}

/// What a single `run` invocation produced.
///
/// `Empty` is not an error — it is the documented way a step declines to
/// produce a record for an input (malformed extraction target, filtered
/// content, ...); the Dispatcher aborts the claim and moves on.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Produced { payload: Value, meta: Value },
    Empty,
}

impl RunOutcome {
    pub fn produced(payload: Value, meta: Value) -> Self {
        Self::Produced { payload, meta }
    }
}

/// A step, independent of what kind of work it does.
#[async_trait]
pub trait Step: Send + Sync {
    /// Unique within a pipeline; used for logging and CLI lookup.
    fn name(&self) -> &str;

    /// `None` for generator steps.
    fn inkey(&self) -> Option<&str>;

    fn outkey(&self) -> &str;

    fn params(&self) -> &StepParams;

    /// Run this step on one input. Must not read or write the store —
    /// the dispatcher owns claim/commit/abort around this call.
    async fn run(&self, id: &str, input: Option<&Value>) -> Result<RunOutcome, PipelineError>;

    /// Enumerate `(id, input)` tuples this step is ready to produce output
    /// for right now. Implementations query `store` directly — it is the
    /// only source of truth for what's already produced — and exclude
    /// `inflight`, the ids the Dispatcher currently has a worker running
    /// for this step (work not yet reflected in `store` as a claim).
    async fn pending_inputs(&self, store: &dyn Store, inflight: &[String]) -> Result<Vec<PendingInput>, PipelineError>;
}

/// Shared logic for the "ordinary transform step" pending-input rule
/// (§4.2): yield every upstream id not already produced (claimed or
/// committed) at `outkey`, and not currently in flight.
pub async fn default_transform_pending(
    store: &dyn Store,
    inkey: &str,
    outkey: &str,
    inflight: &[String],
) -> Result<Vec<PendingInput>, PipelineError> {
    let inputs = store.find(RecordFilter::by_key(inkey)).await?;
    let produced = store.find(RecordFilter::by_key(outkey)).await?;
    let produced_ids: Vec<&str> = produced.iter().map(|r| r.id.as_str()).collect();

    Ok(inputs
        .into_iter()
        .filter_map(|r| match r.state {
            RecordState::Committed { payload, .. } => Some((r.id.into_string(), payload)),
            RecordState::Claimed => None,
        })
        .filter(|(id, _)| !produced_ids.contains(&id.as_str()) && !inflight.iter().any(|p| p == id))
        .map(|(id, payload)| PendingInput { id, input: Some(payload) })
        .collect())
}
