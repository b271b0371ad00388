// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! HTTP client for the chat/completion model backend (§4.5, §6).
//!
//! One entry point, `LlmClient::request`, mirrors the source tool's
//! `universal_llm_request`: a single payload shape POSTed to either
//! `/completions` or `/chat/completions`, with a response parser that
//! accepts both an OpenAI-shaped `choices[]` array and a legacy
//! `{"content": ...}` body.

use reqwest::Client;
use serde_json::{json, Map, Value};

use loom_domain::PipelineError;

use super::tokenizers::ChatMessage;

/// Decoding parameters forwarded verbatim to the backend (§4.4 defaults).
#[derive(Debug, Clone)]
pub struct Sampler {
    pub temperature: f64,
    pub min_p: f64,
    pub repetition_penalty: f64,
    pub max_tokens: u32,
    pub min_tokens: u32,
    /// Extra fields merged into the request body verbatim — carries
    /// `response_format` / `guided_json` / `json_schema` for
    /// `LLMExtraction`'s `schema_mode` (§4.4).
    pub extra: Map<String, Value>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self { temperature: 1.0, min_p: 0.05, repetition_penalty: 1.1, max_tokens: 2048, min_tokens: 10, extra: Map::new() }
    }
}

impl Sampler {
    fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("temperature".to_string(), json!(self.temperature));
        map.insert("min_p".to_string(), json!(self.min_p));
        map.insert("repetition_penalty".to_string(), json!(self.repetition_penalty));
        map.insert("max_tokens".to_string(), json!(self.max_tokens));
        map.insert("min_tokens".to_string(), json!(self.min_tokens));
        for (k, v) in &self.extra {
            map.insert(k.clone(), v.clone());
        }
        map
    }
}

pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { http, base_url: base_url.into(), api_key }
    }

    /// `llm_request(use_completion, model, messages, sampler, n)` (§4.5).
    pub async fn request(
        &self,
        use_completion: bool,
        model: &str,
        messages: &[ChatMessage],
        sampler: &Sampler,
        n: u32,
    ) -> Result<Vec<String>, PipelineError> {
        let mut answers = self.request_once(use_completion, model, messages, sampler, n).await?;

        // Some backends ignore `n`; fan out sequentially to fill the gap.
        while answers.len() < n as usize {
            let mut more = self.request_once(use_completion, model, messages, sampler, 1).await?;
            if more.is_empty() {
                break;
            }
            answers.append(&mut more);
        }

        Ok(answers)
    }

    async fn request_once(
        &self,
        use_completion: bool,
        model: &str,
        messages: &[ChatMessage],
        sampler: &Sampler,
        n: u32,
    ) -> Result<Vec<String>, PipelineError> {
        let mut body = sampler.to_json_map();
        body.insert("model".to_string(), json!(model));
        body.insert("n".to_string(), json!(n));

        let (path, endpoint_body) = if use_completion {
            let prompt = messages.first().map(|m| m.content.clone()).unwrap_or_default();
            body.insert("prompt".to_string(), json!(prompt));
            ("/completions", Value::Object(body))
        } else {
            let msgs: Vec<Value> = messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect();
            body.insert("messages".to_string(), Value::Array(msgs));
            ("/chat/completions", Value::Object(body))
        };

        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.post(url).json(&endpoint_body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| PipelineError::Llm(e.to_string()))?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| PipelineError::Llm(e.to_string()))?;

        if !status.is_success() {
            return Err(PipelineError::Llm(format!("backend returned {status}: {body}")));
        }

        parse_answers(&body)
    }
}

fn parse_answers(response: &Value) -> Result<Vec<String>, PipelineError> {
    if let Some(choices) = response.get("choices").and_then(Value::as_array) {
        return Ok(choices
            .iter()
            .map(|choice| {
                choice
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .or_else(|| choice.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect());
    }

    if let Some(content) = response.get("content").and_then(Value::as_str) {
        return Ok(vec![content.to_string()]);
    }

    Err(PipelineError::Llm(format!("unrecognized backend response shape: {response}")))
}
