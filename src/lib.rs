//! Decision-maker research engine core.
//!
//! This library contains the modules that drive one submitted job from
//! an uploaded company list to a persisted set of validated contacts.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::llm::{LlmClient, LlmClientConfig};
pub use services::{CreditEngine, JobRunner, ResearchPipeline, SearchClient};

/// Application shared state.
///
/// Design Philosophy: Rust's type system IS our DI container. All
/// services are wrapped in Arc for cheap cloning and thread safety.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub credits: Arc<CreditEngine>,
    pub runner: Arc<JobRunner>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let search = Arc::new(SearchClient::new(
            config.search.endpoint.clone(),
            config.search.api_key.clone(),
            config.search.qps,
            config.search.num,
            config.search.timeout_secs,
        ));

        let llm = Arc::new(LlmClient::new(LlmClientConfig {
            api_base: config.llm.api_base.clone(),
            api_key: config.llm.api_key.clone(),
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            concurrency: config.llm.concurrency,
            max_retries: config.llm.max_retries,
            retry_base_secs: config.llm.retry_base_secs,
            use_json_response_format: config.llm.use_json_response_format,
            timeout_secs: config.llm.timeout_secs,
            openrouter_site_url: config.llm.openrouter_site_url.clone(),
            openrouter_app_name: config.llm.openrouter_app_name.clone(),
        }));

        let pipeline = Arc::new(ResearchPipeline::new(
            Arc::clone(&llm),
            Arc::clone(&search),
            config.job.cache_max_items,
            config.job.cache_ttl_secs,
        ));

        let credits = Arc::new(CreditEngine::new(pool.clone()));

        let runner = Arc::new(JobRunner::new(
            pool.clone(),
            pipeline,
            Arc::clone(&credits),
            config.job.concurrency,
            config.job.max_people_per_company,
            config.llm.input_cost_per_m_usd,
            config.llm.output_cost_per_m_usd,
            config.search.cost_per_1k_usd,
        ));

        Self { db: pool, credits, runner }
    }
}
