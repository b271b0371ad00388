// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `ExpandTemplate` (§4.4): renders parameter `template` against the
//! input dictionary with minijinja, configured for Jinja2's default
//! (non-strict) undefined handling — a variable missing from the input
//! renders as an empty string rather than failing the step. Malformed
//! template syntax is still a step failure.

use async_trait::async_trait;
use loom_domain::{default_transform_pending, PendingInput, PipelineError, RunOutcome, Step, StepParams, Store};
use serde_json::{Map, Value};

pub struct ExpandTemplateStep {
    name: String,
    inkey: String,
    outkey: String,
    params: StepParams,
}

impl ExpandTemplateStep {
    pub fn new(name: impl Into<String>, inkey: impl Into<String>, outkey: impl Into<String>, params: StepParams) -> Self {
        Self { name: name.into(), inkey: inkey.into(), outkey: outkey.into(), params }
    }
}

#[async_trait]
impl Step for ExpandTemplateStep {
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
        let template_src: String = self.params.require(&self.name, "template")?;
        let context = input.cloned().unwrap_or(Value::Object(Map::new()));

        let mut env = minijinja::Environment::new();
        // Default `Undefined` behavior: a missing key renders as an empty
        // string rather than raising, matching Jinja2's default.
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
        env.add_template("expand", &template_src)
            .map_err(|e| PipelineError::template(&self.name, e.to_string()))?;
        let tmpl = env.get_template("expand").map_err(|e| PipelineError::template(&self.name, e.to_string()))?;
        let rendered =
            tmpl.render(minijinja::Value::from_serialize(&context)).map_err(|e| PipelineError::template(&self.name, e.to_string()))?;

        Ok(RunOutcome::produced(Value::String(rendered), Value::Object(Map::new())))
    }

    async fn pending_inputs(&self, store: &dyn Store, inflight: &[String]) -> Result<Vec<PendingInput>, PipelineError> {
        default_transform_pending(store, &self.inkey, &self.outkey, inflight).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryStore;

    fn step_with_template(template: &str) -> ExpandTemplateStep {
        let mut p = StepParams::new();
        p.insert("template", template);
        ExpandTemplateStep::new("T", "a", "b", p)
    }

    #[tokio::test]
    async fn renders_against_input() {
        let step = step_with_template("<{{x}}>");
        let outcome = step.run("id1", Some(&serde_json::json!({"x": "abcd"}))).await.unwrap();
        match outcome {
            RunOutcome::Produced { payload, .. } => assert_eq!(payload, Value::String("<abcd>".into())),
            RunOutcome::Empty => panic!("expected Produced"),
        }
    }

    #[tokio::test]
    async fn missing_variable_renders_empty_not_error() {
        let step = step_with_template("<{{missing}}>");
        let outcome = step.run("id1", Some(&serde_json::json!({"x": "abcd"}))).await.unwrap();
        match outcome {
            RunOutcome::Produced { payload, .. } => assert_eq!(payload, Value::String("<>".into())),
            RunOutcome::Empty => panic!("expected Produced"),
        }
    }

    #[tokio::test]
    async fn malformed_template_is_template_error() {
        let step = step_with_template("<{{ unterminated");
        let err = step.run("id1", Some(&serde_json::json!({}))).await.unwrap_err();
        assert!(matches!(err, PipelineError::Template { .. }));
    }

    #[tokio::test]
    async fn pending_inputs_skips_already_produced() {
        let store = InMemoryStore::new();
        store.claim("a", "1").await.unwrap();
        store.commit("a", "1", serde_json::json!({"x": "z"}), serde_json::json!({})).await.unwrap();
        store.claim("b", "1").await.unwrap();
        store.commit("b", "1", serde_json::json!("<z>"), serde_json::json!({})).await.unwrap();

        let step = step_with_template("<{{x}}>");
        let pending = step.pending_inputs(&store, &[]).await.unwrap();
        assert!(pending.is_empty());
    }
}
