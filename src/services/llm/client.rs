//! LLM client for OpenAI-compatible chat completions APIs (OpenAI,
//! OpenRouter, or any compatible gateway). Bounds concurrency with a
//! semaphore, retries transient failures with jittered backoff, and
//! falls back to plain JSON-mode-off requests if a provider rejects
//! `response_format`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::backoff::backoff_delay;
use super::types::Usage;
use crate::utils::CoreError;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

pub struct LlmClientConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base_secs: f64,
    pub use_json_response_format: bool,
    pub timeout_secs: u64,
    pub openrouter_site_url: Option<String>,
    pub openrouter_app_name: Option<String>,
}

pub struct LlmClient {
    http: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_retries: u32,
    retry_base_secs: f64,
    use_json_response_format: AtomicBool,
    semaphore: Arc<Semaphore>,
    extra_headers: Vec<(String, String)>,
}

/// HTTP statuses worth retrying beyond plain server errors: request
/// timeout, conflict, and the CDN-ish "too early" used by some gateways
/// during provider failover, alongside the usual 429.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || (500..600).contains(&status)
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Self {
        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build().expect("reqwest client must build");

        let mut extra_headers = Vec::new();
        if config.api_base.contains("openrouter.ai") {
            if let Some(site) = config.openrouter_site_url {
                extra_headers.push(("HTTP-Referer".to_string(), site));
            }
            if let Some(app) = config.openrouter_app_name {
                extra_headers.push(("X-Title".to_string(), app));
            }
        }

        Self {
            http,
            api_base: config.api_base,
            api_key: config.api_key,
            model: config.model,
            temperature: config.temperature,
            max_retries: config.max_retries,
            retry_base_secs: config.retry_base_secs,
            use_json_response_format: AtomicBool::new(config.use_json_response_format),
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            extra_headers,
        }
    }

    pub(crate) async fn chat(&self, system: &str, user: &Value) -> Result<(String, Usage), CoreError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| CoreError::ProviderDisabled("LLM is not configured".into()))?;

        let user_content = serde_json::to_string(user).map_err(|e| CoreError::Other(anyhow::anyhow!(e)))?;
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        let mut attempt = 0u32;
        let mut response_format_fallback_tried = false;
        loop {
            let use_response_format = self.use_json_response_format.load(Ordering::Relaxed);
            let request = ChatCompletionRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage { role: "system", content: system.to_string() },
                    ChatMessage { role: "user", content: user_content.clone() },
                ],
                temperature: self.temperature,
                response_format: use_response_format.then_some(ResponseFormat { r#type: "json_object" }),
            };

            let _permit = self.semaphore.acquire().await.expect("semaphore is never closed");

            let mut req = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Content-Type", "application/json");
            for (name, value) in &self.extra_headers {
                req = req.header(name, value);
            }

            let result = req.json(&request).send().await;
            drop(_permit);

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.as_u16() == 402 {
                        return Err(CoreError::ProviderDisabled("LLM provider reports insufficient balance".into()));
                    }

                    if status.as_u16() == 400 && use_response_format && !response_format_fallback_tried {
                        let body = response.text().await.unwrap_or_default();
                        if body.to_lowercase().contains("response_format") {
                            tracing::warn!("LLM provider rejected response_format, retrying without it");
                            self.use_json_response_format.store(false, Ordering::Relaxed);
                            response_format_fallback_tried = true;
                            continue;
                        }
                        return Err(CoreError::provider_error(400, body));
                    }

                    if is_retryable_status(status.as_u16()) {
                        if attempt >= self.max_retries {
                            let body = response.text().await.unwrap_or_default();
                            return Err(CoreError::provider_error(status.as_u16(), body));
                        }
                        tokio::time::sleep(backoff_delay(self.retry_base_secs, attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(CoreError::provider_error(status.as_u16(), body));
                    }

                    let parsed: ChatCompletionResponse =
                        response.json().await.map_err(|e| CoreError::MalformedLLMResponse(e.to_string()))?;

                    let content = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or_else(|| CoreError::MalformedLLMResponse("empty choices".into()))?;

                    let usage = parsed
                        .usage
                        .map(|u| Usage { prompt_tokens: u.prompt_tokens, completion_tokens: u.completion_tokens })
                        .unwrap_or_default();

                    return Ok((content, usage));
                },
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(CoreError::provider_error(0, format!("LLM request failed: {e}")));
                    }
                    tokio::time::sleep(backoff_delay(self.retry_base_secs, attempt)).await;
                    attempt += 1;
                },
            }
        }
    }
}
