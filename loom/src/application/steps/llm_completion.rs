// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `LLMCompletion` (§4.4): the plain chat/completion step. If `tokenizer`
//! is set, the input is pre-rendered through its chat template into a
//! single user message; otherwise the input is wrapped verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use loom_domain::{default_transform_pending, PendingInput, PipelineError, RunOutcome, Step, StepParams, Store};
use serde_json::Value;

use crate::infrastructure::llm_client::{LlmClient, Sampler};
use crate::infrastructure::tokenizers::{build_tokenizer, ChatMessage, ExternalTokenizer};

pub struct LlmCompletionStep {
    name: String,
    inkey: String,
    outkey: String,
    params: StepParams,
    client: Arc<LlmClient>,
    external_tokenizer: Option<Arc<dyn ExternalTokenizer>>,
}

impl LlmCompletionStep {
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

    fn sampler(&self) -> Result<Sampler, PipelineError> {
        let mut sampler = Sampler::default();
        sampler.temperature = self.params.get_or(&self.name, "temperature", sampler.temperature)?;
        sampler.min_p = self.params.get_or(&self.name, "min_p", sampler.min_p)?;
        sampler.repetition_penalty = self.params.get_or(&self.name, "repetition_penalty", sampler.repetition_penalty)?;
        sampler.max_tokens = self.params.get_or(&self.name, "max_tokens", sampler.max_tokens)?;
        sampler.min_tokens = self.params.get_or(&self.name, "min_tokens", sampler.min_tokens)?;
        Ok(sampler)
    }

    fn build_message(&self, input: &Value) -> Result<String, PipelineError> {
        let text = match input {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        match self.params.get_str("tokenizer") {
            Some(tokenizer_name) => {
                let tokenizer = build_tokenizer(tokenizer_name, self.external_tokenizer.as_deref())?;
                Ok(tokenizer.apply_chat_template(&[ChatMessage::user(text)]))
            }
            None => Ok(text),
        }
    }
}

#[async_trait]
impl Step for LlmCompletionStep {
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
        let input = input.ok_or_else(|| PipelineError::validation(&self.name, "LLMCompletion requires an input payload"))?;
        let content = self.build_message(input)?;
        let tokenizer = self.params.get_str("tokenizer").map(str::to_string);

        let sampler = self.sampler()?;
        let messages = vec![ChatMessage::user(content)];
        let use_completion = self.params.get_or(&self.name, "use_completion", false)?;

        let answers = self.client.request(use_completion, &model, &messages, &sampler, 1).await?;
        let Some(answer) = answers.into_iter().next() else {
            return Ok(RunOutcome::Empty);
        };

        let meta = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "model": model,
            "tokenizer": tokenizer,
            "sampler": {
                "temperature": sampler.temperature,
                "min_p": sampler.min_p,
                "repetition_penalty": sampler.repetition_penalty,
                "max_tokens": sampler.max_tokens,
                "min_tokens": sampler.min_tokens,
            },
        });

        Ok(RunOutcome::produced(Value::String(answer), meta))
    }

    async fn pending_inputs(&self, store: &dyn Store, inflight: &[String]) -> Result<Vec<PendingInput>, PipelineError> {
        if let Some(model_max) = self.params.get_str("model_max") {
            let model_max: usize = model_max
                .parse()
                .map_err(|e| PipelineError::validation(&self.name, format!("parameter `model_max`: {e}")))?;
            let model: String = self.params.require(&self.name, "model")?;
            let committed = crate::application::model_quota::count_committed_for_model(store, &self.outkey, &model).await?;
            if committed >= model_max {
                return Ok(Vec::new());
            }
        }

        default_transform_pending(store, &self.inkey, &self.outkey, inflight).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryStore;
    use reqwest::Client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params_with_model(model: &str) -> StepParams {
        let mut p = StepParams::new();
        p.insert("model", model);
        p
    }

    #[tokio::test]
    async fn run_returns_first_answer_and_meta() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hello there"}}]
            })))
            .mount(&server)
            .await;

        let client = Arc::new(LlmClient::new(Client::new(), server.uri(), None));
        let step = LlmCompletionStep::new("C", "a", "b", params_with_model("gpt-test"), client, None);

        let outcome = step.run("id1", Some(&serde_json::json!("hi"))).await.unwrap();
        match outcome {
            RunOutcome::Produced { payload, meta } => {
                assert_eq!(payload, Value::String("hello there".into()));
                assert_eq!(meta.get("model").unwrap(), "gpt-test");
            }
            RunOutcome::Empty => panic!("expected Produced"),
        }
    }

    #[tokio::test]
    async fn model_max_blocks_once_quota_reached() {
        let store = InMemoryStore::new();
        store.claim("b", "1").await.unwrap();
        store
            .commit("b", "1", serde_json::json!("x"), serde_json::json!({"model": "gpt-test"}))
            .await
            .unwrap();
        store.claim("a", "2").await.unwrap();
        store.commit("a", "2", serde_json::json!("input"), serde_json::json!({})).await.unwrap();

        let mut params = params_with_model("gpt-test");
        params.insert("model_max", "1");
        let client = Arc::new(LlmClient::new(Client::new(), "http://unused.invalid".to_string(), None));
        let step = LlmCompletionStep::new("C", "a", "b", params, client, None);

        let pending = step.pending_inputs(&store, &[]).await.unwrap();
        assert!(pending.is_empty());
    }
}
