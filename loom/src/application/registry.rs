// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Step registry (§4.6): the embedding application registers named
//! prototypes — each one a built-in kind already wired to a particular
//! `inkey`/`outkey` pair — and the CLI instantiates a runnable [`Step`]
//! per `--step NAME[/k=v]...` occurrence by handing the parsed
//! [`StepParams`] to the matching factory.

use std::collections::BTreeMap;
use std::sync::Arc;

use loom_bootstrap::cli::StepSpec;
use loom_domain::{PipelineError, Step, StepParams};

pub type StepFactory = Arc<dyn Fn(StepParams) -> Box<dyn Step> + Send + Sync>;

#[derive(Default)]
pub struct StepRegistry {
    factories: BTreeMap<String, StepFactory>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(StepParams) -> Box<dyn Step> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Names of every registered prototype, in name order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build a runnable step for one `--step` occurrence. `spec.name`
    /// selects the prototype; `spec.params` are the `k=v` overrides.
    pub fn instantiate(&self, spec: &StepSpec) -> Result<Box<dyn Step>, PipelineError> {
        let factory = self
            .factories
            .get(&spec.name)
            .ok_or_else(|| PipelineError::validation(&spec.name, "no step registered under this name"))?;
        Ok(factory(spec.params.clone()))
    }
}
