//! Search client: a thin, rate-limited wrapper over a Serper-compatible
//! search API. Trims responses to the fields the research pipeline
//! actually reads before they ever reach an LLM prompt.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::utils::CoreError;

const MAX_ORGANIC: usize = 8;
const MAX_PAA: usize = 6;

/// Sliding 1-second window limiter. Holds a ring of recent request
/// timestamps; blocks the caller only long enough to stay under `qps`.
struct RateLimiter {
    qps: usize,
    events: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    fn new(qps: u32) -> Self {
        Self { qps: (qps.max(1)) as usize, events: Mutex::new(VecDeque::new()) }
    }

    async fn acquire(&self) {
        loop {
            let wait = {
                let mut events = self.events.lock().expect("rate limiter mutex poisoned");
                let now = Instant::now();
                let cutoff = now - Duration::from_secs(1);
                while matches!(events.front(), Some(t) if *t < cutoff) {
                    events.pop_front();
                }

                if events.len() < self.qps {
                    events.push_back(now);
                    None
                } else {
                    let oldest = *events.front().expect("len >= qps > 0");
                    Some((oldest + Duration::from_secs(1)).saturating_duration_since(now))
                }
            };

            match wait {
                None => return,
                Some(d) if d.is_zero() => continue,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    gl: &'a str,
    hl: &'a str,
    num: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tbs: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    autocorrect: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub gl: Option<String>,
    #[serde(default)]
    pub hl: Option<String>,
    #[serde(default)]
    pub num: Option<u32>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub tbs: Option<String>,
    #[serde(default)]
    pub autocorrect: Option<bool>,
}

pub struct SearchClient {
    http: Client,
    endpoint: String,
    api_key: String,
    default_num: u32,
    limiter: RateLimiter,
}

impl SearchClient {
    pub fn new(endpoint: String, api_key: Option<String>, qps: u32, num: u32, timeout_secs: u64) -> Self {
        let http = Client::builder().timeout(Duration::from_secs(timeout_secs)).build().expect("reqwest client must build");

        Self { http, endpoint, api_key: api_key.unwrap_or_default(), default_num: num.clamp(1, 100), limiter: RateLimiter::new(qps) }
    }

    /// Run a search, rate-limited to the configured QPS, and return a
    /// trimmed payload containing only `knowledgeGraph`, `organic`, and
    /// `peopleAlsoAsk` fields the research pipeline consumes.
    pub async fn search(&self, query: &SearchQuery) -> Result<Value, CoreError> {
        self.search_with_caps(query, MAX_ORGANIC, MAX_PAA).await
    }

    /// Same as [`Self::search`] but with caller-supplied organic/PAA
    /// trim caps, used when the pipeline wants a deeper or shallower
    /// slice depending on `deep_search`.
    pub async fn search_with_caps(&self, query: &SearchQuery, max_organic: usize, max_paa: usize) -> Result<Value, CoreError> {
        if self.api_key.is_empty() {
            return Err(CoreError::ProviderDisabled("search API key is not configured".into()));
        }
        if self.endpoint.is_empty() {
            return Err(CoreError::ProviderDisabled("search endpoint is not configured".into()));
        }

        let q = query.q.trim();
        if q.is_empty() {
            return Ok(serde_json::json!({ "organic": [] }));
        }

        let request = SearchRequest {
            q,
            gl: query.gl.as_deref().unwrap_or("us"),
            hl: query.hl.as_deref().unwrap_or("en"),
            num: query.num.unwrap_or(self.default_num).clamp(1, 100),
            page: query.page.map(|p| p.max(1)),
            tbs: query.tbs.as_deref(),
            autocorrect: query.autocorrect,
        };

        self.limiter.acquire().await;

        let response = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::provider_error(0, format!("search request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(500).collect();
            return Err(CoreError::provider_error(status.as_u16(), truncated));
        }

        let payload: Value =
            response.json().await.map_err(|e| CoreError::provider_error(status.as_u16(), format!("invalid JSON: {e}")))?;

        Ok(trim_response(&payload, max_organic, max_paa))
    }
}

fn trim_response(payload: &Value, max_organic: usize, max_paa: usize) -> Value {
    let Some(obj) = payload.as_object() else {
        return serde_json::json!({ "organic": [] });
    };

    let mut out = Map::new();

    if let Some(kg) = obj.get("knowledgeGraph").and_then(Value::as_object) {
        let mut trimmed = Map::new();
        for key in ["title", "type", "website", "description", "descriptionLink", "address", "rating", "ratingCount", "reviewCount"]
        {
            if let Some(v) = kg.get(key) {
                trimmed.insert(key.to_string(), v.clone());
            }
        }
        out.insert("knowledgeGraph".to_string(), Value::Object(trimmed));
    }

    let organic = obj
        .get("organic")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(max_organic.max(1))
                .filter_map(Value::as_object)
                .map(|item| {
                    let mut trimmed = Map::new();
                    for key in ["title", "link", "snippet"] {
                        if let Some(v) = item.get(key) {
                            trimmed.insert(key.to_string(), v.clone());
                        }
                    }
                    Value::Object(trimmed)
                })
                .collect()
        })
        .unwrap_or_else(Vec::new);
    out.insert("organic".to_string(), Value::Array(organic));

    if max_paa > 0 {
    if let Some(paa) = obj.get("peopleAlsoAsk").and_then(Value::as_array) {
        let trimmed: Vec<Value> = paa
            .iter()
            .take(max_paa)
            .filter_map(Value::as_object)
            .map(|item| {
                let mut trimmed = Map::new();
                for key in ["question", "snippet", "title", "link"] {
                    if let Some(v) = item.get(key) {
                        trimmed.insert(key.to_string(), v.clone());
                    }
                }
                Value::Object(trimmed)
            })
            .collect();
        out.insert("peopleAlsoAsk".to_string(), Value::Array(trimmed));
    }
    }

    if let Some(credits) = obj.get("credits").filter(|v| v.is_number()) {
        out.insert("credits".to_string(), credits.clone());
    }

    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_response_drops_unknown_fields() {
        let payload = serde_json::json!({
            "organic": [{"title": "a", "link": "b", "snippet": "c", "position": 1}],
            "searchParameters": {"q": "x"},
        });
        let trimmed = trim_response(&payload, MAX_ORGANIC, MAX_PAA);
        assert!(trimmed.get("searchParameters").is_none());
        assert_eq!(trimmed["organic"][0].as_object().unwrap().len(), 3);
    }

    #[test]
    fn trim_response_non_object_yields_empty_organic() {
        let trimmed = trim_response(&Value::String("oops".into()), MAX_ORGANIC, MAX_PAA);
        assert_eq!(trimmed["organic"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn trim_response_caps_organic_at_max() {
        let items: Vec<Value> = (0..20).map(|i| serde_json::json!({"title": format!("t{i}")})).collect();
        let payload = serde_json::json!({ "organic": items });
        let trimmed = trim_response(&payload, MAX_ORGANIC, MAX_PAA);
        assert_eq!(trimmed["organic"].as_array().unwrap().len(), MAX_ORGANIC);
    }

    #[test]
    fn trim_response_respects_zero_paa_cap() {
        let payload = serde_json::json!({ "organic": [], "peopleAlsoAsk": [{"question": "q"}] });
        let trimmed = trim_response(&payload, MAX_ORGANIC, 0);
        assert!(trimmed.get("peopleAlsoAsk").is_none());
    }
}
