// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Backend configuration (§6 "External Interfaces").
//!
//! Peripheral to the engine's correctness, but layered through the
//! `config` crate the way the rest of this codebase loads settings: an
//! optional `loom.toml` in the working directory, overridden by
//! `LOOM_`-prefixed environment variables, with the three backend knobs
//! falling back to their historical unprefixed names for drop-in
//! compatibility with the source tool's environment.

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "http://127.0.0.1:8000/v1";
const DEFAULT_IMAGE_API_URL: &str = "http://127.0.0.1:5001";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("loading configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Connection settings for the model and image backends.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    #[serde(default = "default_image_api_url")]
    pub image_api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_image_api_url() -> String {
    DEFAULT_IMAGE_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl BackendConfig {
    /// Load from an optional `loom.toml` plus environment, preferring
    /// `OPENAI_BASE_URL` / `OPENAI_API_KEY` / `IMAGE_API_URL` (matching
    /// the originating tool's variable names) over `LOOM_`-prefixed ones.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .set_default("openai_base_url", DEFAULT_OPENAI_BASE_URL)?
            .set_default("image_api_url", DEFAULT_IMAGE_API_URL)?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            .add_source(config::File::with_name("loom").required(false))
            .add_source(config::Environment::with_prefix("LOOM"));

        let mut cfg: BackendConfig = builder.build()?.try_deserialize()?;

        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            cfg.openai_base_url = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            cfg.openai_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("IMAGE_API_URL") {
            cfg.image_api_url = v;
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        // SAFETY: test-only env mutation, no concurrent access in this process test.
        for k in ["OPENAI_BASE_URL", "OPENAI_API_KEY", "IMAGE_API_URL", "LOOM_OPENAI_BASE_URL"] {
            unsafe { std::env::remove_var(k) };
        }
        let cfg = BackendConfig::load().unwrap();
        assert_eq!(cfg.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(cfg.image_api_url, DEFAULT_IMAGE_API_URL);
        assert_eq!(cfg.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(cfg.openai_api_key.is_none());
    }
}
