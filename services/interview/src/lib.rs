pub mod config;
pub mod gemini_adapter;
pub mod openai_adapter;
pub mod scenario_loader;

use anyhow::{Context, Result};
use config::{Config, DEFAULT_OPENAI_MODEL, LlmProvider};
use interview_core::{
    InMemoryStore, InterviewEngine, ModelGateway, ScenarioCatalog, ScriptedGateway, SystemClock,
    TokenBucketLimiter,
};
use std::sync::Arc;

/// Creates the gateway for the configured provider.
pub fn build_gateway(config: &Config) -> Result<Arc<dyn ModelGateway>> {
    let gateway: Arc<dyn ModelGateway> = match config.provider {
        LlmProvider::OpenAI => {
            let key = config
                .openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required for the openai provider")?;
            let model = config.chat_model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            tracing::info!("Using OpenAI model {}", model);
            Arc::new(openai_adapter::OpenAIAdapter::new(key, model))
        }
        LlmProvider::Gemini => {
            let key = config
                .gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required for the gemini provider")?;
            Arc::new(gemini_adapter::GeminiAdapter::new(key, config.chat_model.as_deref()))
        }
        LlmProvider::Offline => {
            tracing::info!("Using offline scripted interviewer");
            Arc::new(ScriptedGateway::new())
        }
    };
    Ok(gateway)
}

/// Built-in scenarios plus any found in `SCENARIO_DIR`.
pub fn build_catalog(config: &Config) -> Result<ScenarioCatalog> {
    let extra = match &config.scenario_dir {
        Some(dir) => scenario_loader::load_scenarios(dir).context("Failed to load scenarios")?,
        None => Vec::new(),
    };
    let catalog = ScenarioCatalog::builtin_with(extra);
    tracing::info!("Loaded {} scenarios", catalog.len());
    Ok(catalog)
}

/// Wires an engine with the in-memory store and the system clock.
pub fn build_engine(config: &Config) -> Result<InterviewEngine> {
    let clock = Arc::new(SystemClock);
    let engine = InterviewEngine::builder(build_gateway(config)?, Arc::new(InMemoryStore::new()))
        .with_clock(clock.clone())
        .with_scenarios(Arc::new(build_catalog(config)?))
        .with_rate_limiter(Arc::new(TokenBucketLimiter::new(
            config.rate_limit_burst,
            config.rate_limit_per_minute,
            clock,
        )))
        .with_gateway_timeout(config.gateway_timeout)
        .build();
    Ok(engine)
}
