// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! HTTP client for the image-synthesis backend (§4.4 `Text2Image`, §6).

use reqwest::Client;
use serde_json::Value;

use loom_domain::PipelineError;

pub struct ImageClient {
    http: Client,
    base_url: String,
}

impl ImageClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    /// `POST /sdapi/v1/txt2img`; returns the first image as a base64 string.
    pub async fn txt2img(&self, prompt: &str, width: u32, height: u32, steps: u32) -> Result<String, PipelineError> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url);
        let body = serde_json::json!({ "prompt": prompt, "steps": steps, "width": width, "height": height });

        let response = self.http.post(url).json(&body).send().await.map_err(|e| PipelineError::Image(e.to_string()))?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| PipelineError::Image(e.to_string()))?;

        if !status.is_success() {
            return Err(PipelineError::Image(format!("backend returned {status}: {body}")));
        }

        body.get("images")
            .and_then(Value::as_array)
            .and_then(|images| images.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Image(format!("no images in response: {body}")))
    }
}
