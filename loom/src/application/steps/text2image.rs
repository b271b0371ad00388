// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `Text2Image` (§4.4): input is a text prompt, output is a base64 image
//! from the image-synthesis backend.

use std::sync::Arc;

use async_trait::async_trait;
use loom_domain::{default_transform_pending, PendingInput, PipelineError, RunOutcome, Step, StepParams, Store};
use serde_json::Value;

use crate::infrastructure::image_client::ImageClient;

pub struct Text2ImageStep {
    name: String,
    inkey: String,
    outkey: String,
    params: StepParams,
    client: Arc<ImageClient>,
}

impl Text2ImageStep {
    pub fn new(name: impl Into<String>, inkey: impl Into<String>, outkey: impl Into<String>, params: StepParams, client: Arc<ImageClient>) -> Self {
        Self { name: name.into(), inkey: inkey.into(), outkey: outkey.into(), params, client }
    }
}

#[async_trait]
impl Step for Text2ImageStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn inkey(&self) -> Option<&str> {
        Some(&self.inkey)
    }

    fn outkey(&self) -> &str {
        &self.outkey
    }

    fn params(&self) -> &StepParams {
        &self.params
    }

    async fn run(&self, _id: &str, input: Option<&Value>) -> Result<RunOutcome, PipelineError> {
        let input = input.ok_or_else(|| PipelineError::validation(&self.name, "Text2Image requires an input payload"))?;
        let prompt = match input {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let width: u32 = self.params.get_or(&self.name, "width", 512)?;
        let height: u32 = self.params.get_or(&self.name, "height", 512)?;
        let steps: u32 = self.params.get_or(&self.name, "steps", 20)?;

        let image = self.client.txt2img(&prompt, width, height, steps).await?;
        let meta = serde_json::json!({ "width": width, "height": height, "steps": steps });

        Ok(RunOutcome::produced(Value::String(image), meta))
    }

    async fn pending_inputs(&self, store: &dyn Store, inflight: &[String]) -> Result<Vec<PendingInput>, PipelineError> {
        default_transform_pending(store, &self.inkey, &self.outkey, inflight).await
    }
}
