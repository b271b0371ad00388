// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Step parameters: a `string -> string` map at the boundary (CLI, registry
//! defaults), parsed to typed values inside each step's `run`/`pending_inputs`
//! — the same "dynamic at the edge, typed inside" shape used throughout
//! this design for stage configuration.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::PipelineError;

/// `parallel`, `max`, `qdepth`, `model`, `tokenizer`, `schema_mode`,
/// `max_tokens`, `model_max`, `template`, `prompt`, `schema_json`, `width`,
/// `height`, `steps`, ... — whatever a given step kind understands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepParams(BTreeMap<String, String>);

impl StepParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a required parameter, turning absence or a parse failure into
    /// a [`PipelineError::Validation`] attributed to `step`.
    pub fn require<T>(&self, step: &str, key: &str) -> Result<T, PipelineError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self
            .get_str(key)
            .ok_or_else(|| PipelineError::validation(step, format!("missing required parameter `{key}`")))?;
        raw.parse::<T>()
            .map_err(|e| PipelineError::validation(step, format!("parameter `{key}` = `{raw}`: {e}")))
    }

    /// Parse an optional parameter, defaulting when absent; a malformed
    /// value present in the map is still a validation error.
    pub fn get_or<T>(&self, step: &str, key: &str, default: T) -> Result<T, PipelineError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get_str(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| PipelineError::validation(step, format!("parameter `{key}` = `{raw}`: {e}"))),
        }
    }
}

impl FromIterator<(String, String)> for StepParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
