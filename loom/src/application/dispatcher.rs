// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The Dispatcher (§4.3): drives every registered step to quiescence.
//!
//! Each step gets its own bounded worker pool (`params.parallel`, default
//! 1) gated by a [`Semaphore`]; `qdepth` additionally caps how many
//! in-flight ids a step is willing to carry before it stops yielding new
//! pending work. The control loop never runs step work itself — it only
//! submits `tokio::spawn`ed work items and sleeps between passes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use loom_bootstrap::shutdown::CancellationToken;
use loom_domain::{PipelineError, Step, Store};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

struct StepRuntime {
    step: Arc<dyn Step>,
    parallel: Arc<Semaphore>,
    qdepth: Option<usize>,
    inflight: Arc<Mutex<HashSet<String>>>,
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    steps: Vec<StepRuntime>,
    small_delay: Duration,
    big_delay: Duration,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, small_delay: Duration, big_delay: Duration, shutdown: CancellationToken) -> Self {
        Self { store, steps: Vec::new(), small_delay, big_delay, shutdown }
    }

    /// Register a runnable step (already bound to its `inkey`/`outkey`
    /// and `params` by the registry). Registration order is the scan
    /// order of the main loop.
    pub fn add_step(&mut self, step: Box<dyn Step>) -> Result<(), PipelineError> {
        let step: Arc<dyn Step> = Arc::from(step);
        let parallel: usize = step.params().get_or(step.name(), "parallel", 1usize)?;
        let qdepth: Option<usize> = match step.params().get_str("qdepth") {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|e| PipelineError::validation(step.name(), format!("parameter `qdepth`: {e}")))?,
            ),
            None => None,
        };

        self.steps.push(StepRuntime {
            step,
            parallel: Arc::new(Semaphore::new(parallel.max(1))),
            qdepth,
            inflight: Arc::new(Mutex::new(HashSet::new())),
        });
        Ok(())
    }

    /// Drive every registered step to quiescence (§4.3 main loop), or
    /// until `shutdown` is cancelled.
    pub async fn run(&self) -> Result<(), PipelineError> {
        let mut joinset: JoinSet<()> = JoinSet::new();

        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!("dispatcher: shutdown requested, waiting for in-flight work");
                break;
            }

            let mut submitted = false;

            for runtime in &self.steps {
                if self.shutdown.is_cancelled() {
                    break;
                }

                if let Some(qdepth) = runtime.qdepth {
                    if runtime.inflight.lock().await.len() >= qdepth {
                        continue;
                    }
                }

                let permit = match runtime.parallel.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => continue,
                };

                let inflight_ids: Vec<String> = runtime.inflight.lock().await.iter().cloned().collect();
                let pending = runtime.step.pending_inputs(self.store.as_ref(), &inflight_ids).await?;

                let Some(item) = pending.into_iter().next() else {
                    continue;
                };

                runtime.inflight.lock().await.insert(item.id.clone());
                submitted = true;

                let step = runtime.step.clone();
                let store = self.store.clone();
                let inflight = runtime.inflight.clone();
                let id = item.id.clone();

                joinset.spawn(async move {
                    execute_single_step(store.as_ref(), step.as_ref(), &id, item.input).await;
                    inflight.lock().await.remove(&id);
                    drop(permit);
                });
            }

            // Reap finished tasks so a future pass's quiescence check sees
            // accurate inflight counts without waiting on `joinset` itself.
            while joinset.try_join_next().is_some() {}

            if submitted {
                tokio::time::sleep(self.small_delay).await;
                continue;
            }

            let mut total_inflight = 0;
            for runtime in &self.steps {
                total_inflight += runtime.inflight.lock().await.len();
            }

            if total_inflight == 0 {
                break;
            }

            tokio::time::sleep(self.big_delay).await;
        }

        while joinset.join_next().await.is_some() {}
        Ok(())
    }
}

/// The work item body (§4.3): claim, run, commit or abort.
async fn execute_single_step(store: &dyn Store, step: &dyn Step, id: &str, input: Option<serde_json::Value>) {
    let outkey = step.outkey();

    match store.claim(outkey, id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(step = step.name(), %id, "claim lost the race, skipping");
            return;
        }
        Err(err) => {
            tracing::error!(step = step.name(), %id, error = %err, "claim failed");
            return;
        }
    }

    let outcome = step.run(id, input.as_ref()).await;

    match outcome {
        Ok(loom_domain::RunOutcome::Produced { payload, meta }) => {
            if let Err(err) = store.commit(outkey, id, payload, meta).await {
                tracing::error!(step = step.name(), %id, error = %err, "commit failed");
            }
        }
        Ok(loom_domain::RunOutcome::Empty) => {
            tracing::debug!(step = step.name(), %id, "run produced no output, aborting claim");
            if let Err(err) = store.abort(outkey, id).await {
                tracing::error!(step = step.name(), %id, error = %err, "abort failed");
            }
        }
        Err(err) => {
            tracing::warn!(step = step.name(), %id, error = %err, "run failed, aborting claim");
            if let Err(err) = store.abort(outkey, id).await {
                tracing::error!(step = step.name(), %id, error = %err, "abort failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::steps::expand_template::ExpandTemplateStep;
    use crate::application::steps::generate::GenerateStep;
    use crate::application::steps::llm_completion::LlmCompletionStep;
    use crate::infrastructure::llm_client::LlmClient;
    use crate::infrastructure::InMemoryStore;
    use loom_bootstrap::shutdown::ShutdownCoordinator;
    use loom_domain::{PendingInput, RunOutcome, StepParams};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Wraps a step, tracking how many of its `run` calls are in flight at
    /// once — independent of the dispatcher's own bookkeeping, so the
    /// qdepth test below observes the property from outside.
    struct CountingStep {
        inner: Box<dyn Step>,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Step for CountingStep {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn inkey(&self) -> Option<&str> {
            self.inner.inkey()
        }

        fn outkey(&self) -> &str {
            self.inner.outkey()
        }

        fn params(&self) -> &StepParams {
            self.inner.params()
        }

        async fn run(&self, id: &str, input: Option<&serde_json::Value>) -> Result<RunOutcome, PipelineError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let result = self.inner.run(id, input).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn pending_inputs(&self, store: &dyn Store, inflight: &[String]) -> Result<Vec<PendingInput>, PipelineError> {
            self.inner.pending_inputs(store, inflight).await
        }
    }

    #[tokio::test]
    async fn qdepth_caps_inflight_work_at_any_instant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(100))
                    .set_body_json(serde_json::json!({"choices": [{"message": {"content": "ok"}}]})),
            )
            .mount(&server)
            .await;

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        for i in 0..10 {
            let id = i.to_string();
            store.claim("a", &id).await.unwrap();
            store.commit("a", &id, serde_json::json!("hi"), serde_json::json!({})).await.unwrap();
        }

        let client = Arc::new(LlmClient::new(reqwest::Client::new(), server.uri(), None));
        let mut params = StepParams::new();
        params.insert("model", "gpt-test");
        params.insert("parallel", "4");
        params.insert("qdepth", "4");
        let inner = LlmCompletionStep::new("Slow", "a", "b", params, client, None);

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let step = CountingStep { inner: Box::new(inner), current: current.clone(), peak: peak.clone() };

        let shutdown = ShutdownCoordinator::default().token();
        let mut dispatcher = Dispatcher::new(store.clone(), Duration::from_millis(5), Duration::from_millis(5), shutdown);
        dispatcher.add_step(Box::new(step)).unwrap();

        dispatcher.run().await.unwrap();

        let observed_peak = peak.load(Ordering::SeqCst);
        assert!(observed_peak <= 4, "peak inflight {observed_peak} exceeded qdepth 4");
        assert!(observed_peak >= 2, "test never observed overlapping work, peak was {observed_peak}");

        let rendered = store.find(loom_domain::RecordFilter::by_key("b")).await.unwrap();
        assert_eq!(rendered.len(), 10);
    }

    #[tokio::test]
    async fn two_step_pipeline_runs_to_quiescence() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let shutdown = ShutdownCoordinator::default().token();
        let mut dispatcher = Dispatcher::new(store.clone(), Duration::from_millis(5), Duration::from_millis(5), shutdown);

        let mut gen_params = StepParams::new();
        gen_params.insert("max", "3");
        dispatcher.add_step(Box::new(GenerateStep::new("Gen", "seed", gen_params))).unwrap();

        let mut tmpl_params = StepParams::new();
        tmpl_params.insert("template", "hello");
        dispatcher.add_step(Box::new(ExpandTemplateStep::new("Tmpl", "seed", "rendered", tmpl_params))).unwrap();

        dispatcher.run().await.unwrap();

        let seeds = store.find(loom_domain::RecordFilter::by_key("seed")).await.unwrap();
        let rendered = store.find(loom_domain::RecordFilter::by_key("rendered")).await.unwrap();
        assert_eq!(seeds.len(), 3);
        assert_eq!(rendered.len(), 3);
    }

    #[tokio::test]
    async fn resumes_without_redoing_committed_work() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        store.claim("seed", "1").await.unwrap();
        store.commit("seed", "1", serde_json::json!({}), serde_json::json!({})).await.unwrap();
        store.claim("rendered", "1").await.unwrap();
        store.commit("rendered", "1", serde_json::json!("hello"), serde_json::json!({})).await.unwrap();

        let shutdown = ShutdownCoordinator::default().token();
        let mut dispatcher = Dispatcher::new(store.clone(), Duration::from_millis(5), Duration::from_millis(5), shutdown);

        let mut gen_params = StepParams::new();
        gen_params.insert("max", "2");
        dispatcher.add_step(Box::new(GenerateStep::new("Gen", "seed", gen_params))).unwrap();

        let mut tmpl_params = StepParams::new();
        tmpl_params.insert("template", "hello");
        dispatcher.add_step(Box::new(ExpandTemplateStep::new("Tmpl", "seed", "rendered", tmpl_params))).unwrap();

        dispatcher.run().await.unwrap();

        let seeds = store.find(loom_domain::RecordFilter::by_key("seed")).await.unwrap();
        let rendered = store.find(loom_domain::RecordFilter::by_key("rendered")).await.unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(rendered.len(), 2);
    }
}
