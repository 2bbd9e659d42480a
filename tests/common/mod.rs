//! Shared integration-test helpers: an in-memory database plus thin
//! wrappers for standing up fake search/LLM providers with wiremock.

use decision_engine::services::llm::{LlmClient, LlmClientConfig};
use decision_engine::services::{ResearchPipeline, SearchClient};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

/// Create an in-memory SQLite database for testing.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("failed to create test database");

    sqlx::migrate!().run(&pool).await.expect("failed to run migrations");

    pool
}

/// Build a research pipeline backed by fake search/LLM servers, so a
/// job can be driven end-to-end without reaching any real provider.
pub async fn test_pipeline(search_server: &MockServer, llm_server: &MockServer) -> Arc<ResearchPipeline> {
    let search = Arc::new(SearchClient::new(
        format!("{}/search", search_server.uri()),
        Some("test-search-key".to_string()),
        10,
        10,
        5,
    ));

    let llm = Arc::new(LlmClient::new(LlmClientConfig {
        api_base: llm_server.uri(),
        api_key: Some("test-llm-key".to_string()),
        model: "test-model".to_string(),
        temperature: 0.0,
        concurrency: 4,
        max_retries: 0,
        retry_base_secs: 0.0,
        use_json_response_format: false,
        timeout_secs: 5,
        openrouter_site_url: None,
        openrouter_app_name: None,
    }));

    Arc::new(ResearchPipeline::new(llm, search, 100, 60))
}

/// Build a chat-completions JSON body wiremock can return for the LLM
/// mock server, wrapping `content` as the assistant message.
pub fn chat_completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "content": content } }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 34 },
    })
}
