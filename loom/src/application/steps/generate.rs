// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `Generate` (§4.4): the one built-in step with no `inkey`. Its pending
//! work is a target count of fresh ids (§4.2 "Generator `pending_inputs`").
//!
//! The initial variables a run seeds are pipeline-specific (a template
//! technique, a sampled seed word, ...); this built-in kind exposes that
//! as a static key/value bundle carried in the step's own parameters —
//! every non-reserved `k=v` given on `--step Generate/...` becomes a
//! field of the record it produces. A pipeline author who needs
//! generated (non-static) values registers a custom `Step` instead; the
//! built-in kind only needs to hand the dispatcher a fresh id.

use async_trait::async_trait;
use loom_domain::{PendingInput, PipelineError, RecordFilter, RunOutcome, Step, StepParams, Store};
use serde_json::{Map, Value};

const RESERVED_PARAMS: &[&str] = &["max", "qdepth", "parallel"];

pub struct GenerateStep {
    name: String,
    outkey: String,
    params: StepParams,
}

impl GenerateStep {
    pub fn new(name: impl Into<String>, outkey: impl Into<String>, params: StepParams) -> Self {
        Self { name: name.into(), outkey: outkey.into(), params }
    }
}

#[async_trait]
impl Step for GenerateStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn inkey(&self) -> Option<&str> {
        None
    }

    fn outkey(&self) -> &str {
        &self.outkey
    }

    fn params(&self) -> &StepParams {
        &self.params
    }

    async fn run(&self, _id: &str, _input: Option<&Value>) -> Result<RunOutcome, PipelineError> {
        let mut fields = Map::new();
        for (k, v) in self.params.iter() {
            if !RESERVED_PARAMS.contains(&k) {
                fields.insert(k.to_string(), Value::String(v.to_string()));
            }
        }
        Ok(RunOutcome::produced(Value::Object(fields), Value::Object(Map::new())))
    }

    async fn pending_inputs(&self, store: &dyn Store, inflight: &[String]) -> Result<Vec<PendingInput>, PipelineError> {
        let max: usize = self.params.require(&self.name, "max")?;
        let produced = store.find(RecordFilter::by_key(&self.outkey)).await?.len() + inflight.len();
        let remaining = max.saturating_sub(produced);

        Ok((0..remaining)
            .map(|_| PendingInput { id: loom_domain::RecordId::fresh().into_string(), input: None })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryStore;

    fn params(max: &str) -> StepParams {
        let mut p = StepParams::new();
        p.insert("max", max);
        p
    }

    #[tokio::test]
    async fn pending_inputs_yields_max_minus_produced() {
        let store = InMemoryStore::new();
        let step = GenerateStep::new("G", "a", params("3"));
        let pending = step.pending_inputs(&store, &[]).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.iter().all(|p| p.input.is_none()));
    }

    #[tokio::test]
    async fn pending_inputs_accounts_for_inflight() {
        let store = InMemoryStore::new();
        let step = GenerateStep::new("G", "a", params("3"));
        let pending = step.pending_inputs(&store, &["x".into(), "y".into()]).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn run_copies_non_reserved_params() {
        let mut p = params("3");
        p.insert("technique", "haiku");
        let step = GenerateStep::new("G", "a", p);
        let outcome = step.run("id1", None).await.unwrap();
        match outcome {
            RunOutcome::Produced { payload, .. } => {
                assert_eq!(payload.get("technique").unwrap(), "haiku");
                assert!(payload.get("max").is_none());
            }
            RunOutcome::Empty => panic!("expected Produced"),
        }
    }

    #[tokio::test]
    async fn missing_max_is_validation_error() {
        let step = GenerateStep::new("G", "a", StepParams::new());
        let store = InMemoryStore::new();
        let err = step.pending_inputs(&store, &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }
}
