// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `LLMExtraction` (§4.4): `LLMCompletion` constrained for structured
//! extraction — `prompt` prepended to the input, sampling forced to
//! `temperature = 0`, and the response narrowed to JSON by
//! [`simple_extract_json`] before being committed as the payload.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use loom_domain::{default_transform_pending, PendingInput, PipelineError, RunOutcome, Step, StepParams, Store};
use serde_json::Value;

use crate::application::json_extract::simple_extract_json;
use crate::application::model_quota::count_committed_for_model;
use crate::infrastructure::llm_client::{LlmClient, Sampler};
use crate::infrastructure::tokenizers::{build_tokenizer, ChatMessage, ExternalTokenizer};

pub struct LlmExtractionStep {
    name: String,
    inkey: String,
    outkey: String,
    params: StepParams,
    client: Arc<LlmClient>,
    external_tokenizer: Option<Arc<dyn ExternalTokenizer>>,
}

impl LlmExtractionStep {
    pub fn new(
        name: impl Into<String>,
        inkey: impl Into<String>,
        outkey: impl Into<String>,
        params: StepParams,
        client: Arc<LlmClient>,
        external_tokenizer: Option<Arc<dyn ExternalTokenizer>>,
    ) -> Self {
        Self { name: name.into(), inkey: inkey.into(), outkey: outkey.into(), params, client, external_tokenizer }
    }

    /// Apply `schema_mode` (§4.4) to `sampler.extra`. `schema_json` is
    /// required whenever `schema_mode` is anything but `none`.
    fn apply_schema_mode(&self, sampler: &mut Sampler) -> Result<(), PipelineError> {
        let mode = self.params.get_str("schema_mode").unwrap_or("none");
        if mode == "none" {
            return Ok(());
        }

        let schema_raw: String = self.params.require(&self.name, "schema_json")?;
        let schema: Value = serde_json::from_str(&schema_raw)
            .map_err(|e| PipelineError::validation(&self.name, format!("parameter `schema_json` is not valid JSON: {e}")))?;

        match mode {
            "openai-schema" => {
                sampler.extra.insert(
                    "response_format".to_string(),
                    serde_json::json!({"type": "json_schema", "json_schema": {"name": "extraction", "schema": schema}}),
                );
            }
            "openai-json" => {
                sampler.extra.insert("response_format".to_string(), serde_json::json!({"type": "json_object"}));
            }
            "vllm" => {
                sampler.extra.insert("guided_json".to_string(), schema);
            }
            "llama" => {
                sampler.extra.insert("json_schema".to_string(), schema);
            }
            other => {
                return Err(PipelineError::validation(&self.name, format!("unknown `schema_mode` `{other}`")));
            }
        }
        Ok(())
    }

    fn build_message(&self, input: &Value) -> Result<String, PipelineError> {
        let prompt: String = self.params.require(&self.name, "prompt")?;
        let input_text = match input {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let combined = format!("{prompt}\n\n{input_text}");

        match self.params.get_str("tokenizer") {
            Some(tokenizer_name) => {
                let tokenizer = build_tokenizer(tokenizer_name, self.external_tokenizer.as_deref())?;
                Ok(tokenizer.apply_chat_template(&[ChatMessage::user(combined)]))
            }
            None => Ok(combined),
        }
    }
}

#[async_trait]
impl Step for LlmExtractionStep {
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
        let model: String = self.params.require(&self.name, "model")?;
        let input = input.ok_or_else(|| PipelineError::validation(&self.name, "LLMExtraction requires an input payload"))?;
        let content = self.build_message(input)?;

        let max_tokens: u32 = self.params.get_or(&self.name, "max_tokens", 3000)?;
        let mut sampler = Sampler { temperature: 0.0, max_tokens, ..Sampler::default() };
        self.apply_schema_mode(&mut sampler)?;

        let messages = vec![ChatMessage::user(content)];
        let answers = self.client.request(false, &model, &messages, &sampler, 1).await?;
        let Some(answer) = answers.into_iter().next() else {
            return Ok(RunOutcome::Empty);
        };

        let Some(extracted) = simple_extract_json(&answer, false) else {
            return Ok(RunOutcome::Empty);
        };

        let meta = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "model": model,
            "schema_mode": self.params.get_str("schema_mode").unwrap_or("none"),
        });

        Ok(RunOutcome::produced(extracted, meta))
    }

    async fn pending_inputs(&self, store: &dyn Store, inflight: &[String]) -> Result<Vec<PendingInput>, PipelineError> {
        if let Some(model_max) = self.params.get_str("model_max") {
            let model_max: usize = model_max
                .parse()
                .map_err(|e| PipelineError::validation(&self.name, format!("parameter `model_max`: {e}")))?;
            let model: String = self.params.require(&self.name, "model")?;
            if count_committed_for_model(store, &self.outkey, &model).await? >= model_max {
                return Ok(Vec::new());
            }
        }

        default_transform_pending(store, &self.inkey, &self.outkey, inflight).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(model: &str, prompt: &str) -> StepParams {
        let mut p = StepParams::new();
        p.insert("model", model);
        p.insert("prompt", prompt);
        p
    }

    #[tokio::test]
    async fn run_extracts_json_from_surrounding_prose() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Sure! {\"name\": \"Zha\"} enjoy"}}]
            })))
            .mount(&server)
            .await;

        let client = Arc::new(LlmClient::new(Client::new(), server.uri(), None));
        let step = LlmExtractionStep::new("E", "a", "b", params("gpt-test", "extract the name"), client, None);

        let outcome = step.run("id1", Some(&serde_json::json!("some text"))).await.unwrap();
        match outcome {
            RunOutcome::Produced { payload, .. } => assert_eq!(payload, serde_json::json!({"name": "Zha"})),
            RunOutcome::Empty => panic!("expected Produced"),
        }
    }

    #[tokio::test]
    async fn run_is_empty_when_no_json_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "no json here"}}]
            })))
            .mount(&server)
            .await;

        let client = Arc::new(LlmClient::new(Client::new(), server.uri(), None));
        let step = LlmExtractionStep::new("E", "a", "b", params("gpt-test", "extract"), client, None);

        let outcome = step.run("id1", Some(&serde_json::json!("x"))).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Empty));
    }

    #[tokio::test]
    async fn unknown_schema_mode_is_validation_error() {
        let client = Arc::new(LlmClient::new(Client::new(), "http://unused.invalid".to_string(), None));
        let mut p = params("gpt-test", "extract");
        p.insert("schema_mode", "bogus");
        p.insert("schema_json", "{}");
        let step = LlmExtractionStep::new("E", "a", "b", p, client, None);

        let err = step.run("id1", Some(&serde_json::json!("x"))).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[tokio::test]
    async fn vllm_schema_mode_sets_guided_json() {
        let mut sampler = Sampler::default();
        let client = Arc::new(LlmClient::new(Client::new(), "http://unused.invalid".to_string(), None));
        let mut p = params("gpt-test", "extract");
        p.insert("schema_mode", "vllm");
        p.insert("schema_json", r#"{"type": "object"}"#);
        let step = LlmExtractionStep::new("E", "a", "b", p, client, None);

        step.apply_schema_mode(&mut sampler).unwrap();
        assert_eq!(sampler.extra.get("guided_json").unwrap(), &serde_json::json!({"type": "object"}));
    }
}
