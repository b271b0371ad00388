// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! CLI entry point (§4.6, §6).
//!
//! Registers a small demonstration pipeline grounded in the source tool's
//! own dataset-construction scripts — generate seed variables, expand a
//! template into a prompt, have a model complete and extract structured
//! JSON from it, then illustrate the result — and runs whichever subset
//! `--step` selects to quiescence.

use std::sync::Arc;
use std::time::Duration;

use loom::application::dispatcher::Dispatcher;
use loom::application::registry::StepRegistry;
use loom::application::steps::expand_template::ExpandTemplateStep;
use loom::application::steps::generate::GenerateStep;
use loom::application::steps::llm_completion::LlmCompletionStep;
use loom::application::steps::llm_extraction::LlmExtractionStep;
use loom::application::steps::text2image::Text2ImageStep;
use loom::infrastructure::config::BackendConfig;
use loom::infrastructure::image_client::ImageClient;
use loom::infrastructure::llm_client::LlmClient;
use loom::infrastructure::logging;
use loom::infrastructure::repositories::SqliteStore;
use loom::Store;
use loom_bootstrap::shutdown::ShutdownCoordinator;

fn default_registry(llm: Arc<LlmClient>, image: Arc<ImageClient>) -> StepRegistry {
    let mut registry = StepRegistry::new();

    registry.register("Scenario", |params| Box::new(GenerateStep::new("Scenario", "vars", params)));

    registry.register("IdeaPrompt", |mut params| {
        if params.get_str("template").is_none() {
            params.insert("template", "<{{topic}}>");
        }
        Box::new(ExpandTemplateStep::new("IdeaPrompt", "vars", "idea_prompt", params))
    });

    {
        let llm = llm.clone();
        registry.register("GenIdea", move |params| {
            Box::new(LlmExtractionStep::new("GenIdea", "idea_prompt", "idea", params, llm.clone(), None))
        });
    }

    registry.register("TaskPrompt", |mut params| {
        if params.get_str("template").is_none() {
            params.insert("template", "<{{idea}}>");
        }
        Box::new(ExpandTemplateStep::new("TaskPrompt", "idea", "task_prompt", params))
    });

    {
        let llm = llm.clone();
        registry.register("GenTask", move |params| {
            Box::new(LlmCompletionStep::new("GenTask", "task_prompt", "task", params, llm.clone(), None))
        });
    }

    registry.register("Illustrate", move |params| {
        Box::new(Text2ImageStep::new("Illustrate", "task", "image", params, image.clone()))
    });

    registry
}

async fn run() -> anyhow::Result<()> {
    let cli = loom_bootstrap::bootstrap_cli()?;
    logging::init(cli.verbose);

    let backend = BackendConfig::load()?;
    let http = reqwest::Client::builder().timeout(Duration::from_secs(backend.request_timeout_secs)).build()?;
    let llm = Arc::new(LlmClient::new(http.clone(), backend.openai_base_url.clone(), backend.openai_api_key.clone()));
    let image = Arc::new(ImageClient::new(http, backend.image_api_url.clone()));

    let database_url = format!("sqlite://{}.db", cli.project);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&database_url).await?);

    if let Some(max_age) = cli.claim_ttl_secs {
        for key in store.all_keys().await? {
            let removed = store.sweep_orphaned_claims(&key, max_age).await?;
            if removed > 0 {
                tracing::info!(key, removed, "swept orphaned claims");
            }
        }
    }

    let registry = default_registry(llm, image);
    tracing::info!(steps = %registry.names().join(", "), "Available Steps");

    let shutdown = ShutdownCoordinator::default();
    tokio::spawn(loom_bootstrap::signals::watch(shutdown.clone()));

    let mut dispatcher =
        Dispatcher::new(store, Duration::from_millis(cli.small_delay_ms), Duration::from_millis(cli.big_delay_ms), shutdown.token());

    for spec in &cli.steps {
        let step = registry.instantiate(spec)?;
        dispatcher.add_step(step)?;
    }

    dispatcher.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    loom_bootstrap::result_to_exit_code(run().await)
}
