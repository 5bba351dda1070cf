//! Bidscout - procurement signal discovery runner
//!
//! Loads the engine config and entity list, runs the discovery pool against
//! a search provider and an OpenAI-compatible model, and prints the
//! aggregate report as JSON.

mod config;
mod sink;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bidscout_agent::{LlmBackend, LlmEvaluator, OpenAiBackend};
use bidscout_engine::{
    CancellationFlag, DiscoveryEngine, DiscoveryPool, DiscoveryReport, EngineConfig,
    HttpEvidenceFetcher, RetryingFetcher, SinkWriter,
};
use bidscout_model::Entity;

use crate::config::Args;
use crate::sink::JsonlKnowledgeSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(&args);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let engine_config = match load_engine_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };
    let entities = load_entities(&args).await?;

    info!("======================================");
    info!("  Bidscout - procurement discovery");
    info!("======================================");
    info!("Entities: {}", entities.len());
    info!("Categories: {}", engine_config.categories.len());
    info!("Workers: {}", engine_config.pool.max_workers);
    info!("Search: {}", args.search_url);
    info!("Model: {} @ {}", args.llm_model, args.llm_base_url);
    info!("Episodes: {}", args.episodes.display());
    info!("======================================");

    // Evidence evaluator
    let backend = OpenAiBackend::with_timeout(
        args.llm_base_url.clone(),
        args.llm_model.clone(),
        args.llm_api_key.clone(),
        Duration::from_millis(engine_config.evaluator.timeout_ms),
    )
    .context("creating LLM backend")?;
    let evaluator = Arc::new(
        LlmEvaluator::new(vec![Arc::new(backend) as Arc<dyn LlmBackend>])
            .with_config(engine_config.evaluator.clone()),
    );

    // Evidence fetcher
    let http = HttpEvidenceFetcher::new(args.search_url.clone(), engine_config.fetcher.max_chars)
        .context("creating search client")?
        .with_api_key(args.search_api_key.clone());
    let fetcher = Arc::new(RetryingFetcher::new(Arc::new(http), &engine_config.fetcher));

    // Knowledge sink
    let episodes = JsonlKnowledgeSink::open(&args.episodes)
        .await
        .context("opening episode log")?;
    if !episodes.is_empty() {
        info!("Episodes on record: {}", episodes.len());
    }
    let sink = SinkWriter::new(Arc::new(episodes));

    let engine = Arc::new(
        DiscoveryEngine::new(engine_config.clone(), fetcher, evaluator.clone(), sink)
            .context("building discovery engine")?,
    );
    let pool = DiscoveryPool::new(engine, &engine_config.pool);

    // Ctrl-C stops every worker at its next hop boundary
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping at next hop boundary");
                cancel.cancel();
            }
        });
    }

    let outcome = pool.run(entities, &cancel).await;
    for failure in &outcome.failures {
        warn!(entity_id = %failure.entity_id, "{}", failure.error);
    }
    if outcome.pending_episodes > 0 {
        warn!(
            pending = outcome.pending_episodes,
            "Episodes still queued; knowledge sink unreachable"
        );
    }

    let report = DiscoveryReport::build(&outcome.runs, &engine_config.reporting);
    let stats = evaluator.audit().stats().await;
    info!(
        evaluations = stats.evaluations,
        validations = stats.validations,
        failed = stats.failed,
        retried = stats.retried,
        total_tokens = stats.total_tokens,
        "Evaluator usage"
    );

    let json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("bidscout={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn load_engine_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let yaml = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_yaml(&yaml)?
        }
        None => EngineConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.pool.max_workers = workers;
    }
    config.validate()?;
    Ok(config)
}

async fn load_entities(args: &Args) -> anyhow::Result<Vec<Entity>> {
    let yaml = tokio::fs::read_to_string(&args.entities)
        .await
        .with_context(|| format!("reading {}", args.entities.display()))?;
    let entities: Vec<Entity> = serde_yaml::from_str(&yaml)
        .with_context(|| format!("parsing {}", args.entities.display()))?;
    Ok(entities)
}
