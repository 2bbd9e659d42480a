//! Research pipeline: INIT → PLAN → SEARCH → EXTRACT → DONE. Finds
//! decision-makers for one company, backed by a process-wide TTL cache
//! keyed on the full input shape so repeated rows across jobs (or
//! retries within a job) don't re-spend search/LLM calls.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::llm::LlmClient;
use super::normalize::extract_emails;
use super::search::{SearchClient, SearchQuery};
use crate::utils::{cache_key, coerce_people_array, extract_json};

const STRIP_PHRASE_RX_SOURCE: &str = r"(?i)decision[- ]?makers?";

#[derive(Debug, Clone, Serialize)]
pub struct ResearchInput {
    pub company_name: String,
    pub location: Option<String>,
    pub google_maps_url: Option<String>,
    pub website: Option<String>,
    pub company_type: Option<String>,
    pub platforms: Vec<String>,
    pub max_people: usize,
    pub deep_search: bool,
    pub role_keywords: Vec<String>,
    pub max_search_calls: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PersonResult {
    pub name: String,
    pub title: String,
    pub platform: String,
    pub profile_url: String,
    pub confidence: String,
    pub reasoning: String,
    pub emails_found: Vec<String>,
    pub company_website: String,
    pub company_type: String,
    pub company_address: String,
    pub gmaps_rating: Option<f64>,
    pub gmaps_reviews: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchTrace {
    pub llm_input: Value,
    pub serper_queries: Vec<String>,
    pub serper_calls: i64,
    pub llm_calls: i64,
    pub llm_call_timestamp: Option<DateTime<Utc>>,
    pub serper_call_timestamp: Option<DateTime<Utc>>,
    pub llm_usage: Value,
    pub llm_output: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutput {
    pub people: Vec<PersonResult>,
    pub trace: ResearchTrace,
}

struct CacheEntry {
    inserted_at: Instant,
    value: ResearchOutput,
}

pub struct ResearchPipeline {
    llm: Arc<LlmClient>,
    search: Arc<SearchClient>,
    cache: DashMap<String, CacheEntry>,
    cache_max_items: usize,
    cache_ttl: Duration,
}

impl ResearchPipeline {
    pub fn new(llm: Arc<LlmClient>, search: Arc<SearchClient>, cache_max_items: usize, cache_ttl_secs: u64) -> Self {
        Self { llm, search, cache: DashMap::new(), cache_max_items, cache_ttl: Duration::from_secs(cache_ttl_secs) }
    }

    pub async fn research(&self, input: &ResearchInput) -> ResearchOutput {
        let key = cache_key("enrich_company:", input);

        if let Some(entry) = self.cache.get(&key) {
            if entry.inserted_at.elapsed() < self.cache_ttl {
                return entry.value.clone();
            }
        }

        let output = self.run_pipeline(input).await;
        self.insert_cache(key, output.clone());
        output
    }

    fn insert_cache(&self, key: String, value: ResearchOutput) {
        if self.cache.len() >= self.cache_max_items {
            let now = Instant::now();
            let expired: Vec<String> = self
                .cache
                .iter()
                .filter(|e| now.duration_since(e.inserted_at) >= self.cache_ttl)
                .map(|e| e.key().clone())
                .collect();
            for k in expired {
                self.cache.remove(&k);
            }
        }
        self.cache.insert(key, CacheEntry { inserted_at: Instant::now(), value });
    }

    async fn run_pipeline(&self, input: &ResearchInput) -> ResearchOutput {
        let plan = self.plan(input).await;
        let (serper_results, serper_calls, serper_call_timestamp) = self.search_all(&plan.queries, input).await;
        self.extract(input, &plan, serper_results, serper_calls, serper_call_timestamp).await
    }

    async fn plan(&self, input: &ResearchInput) -> PlanResult {
        if !input.deep_search {
            let keywords: Vec<&String> = input.role_keywords.iter().take(5).collect();
            let mut q = format!("(\"{}\")", input.company_name);
            if !keywords.is_empty() {
                let disjunction = keywords.iter().map(|k| format!("\"{k}\"")).collect::<Vec<_>>().join(" OR ");
                q.push_str(&format!(" AND ({disjunction})"));
            }
            if let Some(loc) = input.location.as_deref().filter(|l| !l.trim().is_empty()) {
                q.push_str(&format!(" AND \"{}\"", loc.trim()));
            }
            return PlanResult { queries: vec![q], notes: String::new(), plan_messages: None, plan_usage: None };
        }

        let hint = self.deep_search_hint(input);
        let mut q = format!("(\"{}\")", input.company_name);
        if !input.role_keywords.is_empty() {
            let keywords: Vec<&String> = input.role_keywords.iter().take(5).collect();
            let disjunction = keywords.iter().map(|k| format!("\"{k}\"")).collect::<Vec<_>>().join(" OR ");
            q.push_str(&format!(" AND ({disjunction})"));
        }
        if let Some(loc) = input.location.as_deref().filter(|l| !l.trim().is_empty()) {
            q.push_str(&format!(" AND \"{}\"", loc.trim()));
        }
        if let Some(h) = hint {
            q.push_str(&format!(" OR ({h})"));
        }

        let planner_system = "You are a search query planner. Return ONLY a raw JSON object matching \
             {queries:[{q, gl?, hl?, num?, page?}], notes}. Never use the literal phrase \"decision maker\" or \
             \"decision makers\" in any query.";
        let planner_user = json!({
            "company_name": input.company_name,
            "location": input.location,
            "website": input.website,
            "company_type": input.company_type,
            "role_keywords": input.role_keywords,
            "max_queries": input.max_search_calls,
            "seed_query": q,
        });

        match self.llm.chat(planner_system, &planner_user).await {
            Ok((text, usage)) => {
                let payload = extract_json(&text).unwrap_or(Value::Null);
                let mut queries: Vec<String> = payload
                    .get("queries")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|item| item.get("q").and_then(Value::as_str))
                            .map(|s| s.to_string())
                            .collect()
                    })
                    .unwrap_or_default();

                let forbidden = regex::Regex::new(STRIP_PHRASE_RX_SOURCE).expect("static pattern");
                queries.retain(|query| !forbidden.is_match(query));
                queries.truncate(input.max_search_calls.max(1));
                if queries.is_empty() {
                    queries.push(q);
                }

                let notes = payload.get("notes").and_then(Value::as_str).unwrap_or("").to_string();
                PlanResult {
                    queries,
                    notes,
                    plan_messages: Some(json!({"system": planner_system, "user": planner_user})),
                    plan_usage: Some(json!({"prompt_tokens": usage.prompt_tokens, "completion_tokens": usage.completion_tokens})),
                }
            },
            Err(_) => PlanResult {
                queries: vec![q],
                notes: String::new(),
                plan_messages: Some(json!({"system": planner_system, "user": planner_user})),
                plan_usage: None,
            },
        }
    }

    fn deep_search_hint(&self, input: &ResearchInput) -> Option<String> {
        let host = input
            .website
            .as_deref()
            .map(|w| w.trim().trim_start_matches("https://").trim_start_matches("http://").trim_start_matches("www."))
            .map(|w| w.split('/').next().unwrap_or(w).to_string())
            .filter(|w| !w.is_empty());

        let parts: Vec<String> = [host, input.location.clone(), input.company_type.clone()]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() { None } else { Some(parts.join(" ")) }
    }

    async fn search_all(
        &self,
        queries: &[String],
        input: &ResearchInput,
    ) -> (Vec<Value>, i64, Option<DateTime<Utc>>) {
        let max_organic = if input.deep_search { 8 } else { 4 };
        let max_paa = if input.deep_search { 6 } else { 0 };
        let strip_rx = regex::Regex::new(STRIP_PHRASE_RX_SOURCE).expect("static pattern");

        let mut results = Vec::with_capacity(queries.len());
        let mut calls = 0i64;
        let mut first_timestamp = None;

        for q in queries {
            let search_query = SearchQuery { q: q.clone(), ..Default::default() };
            let outcome = self.search.search_with_caps(&search_query, max_organic, max_paa).await;
            calls += 1;
            match outcome {
                Ok(mut value) => {
                    if first_timestamp.is_none() {
                        first_timestamp = Some(Utc::now());
                    }
                    strip_phrase_in_place(&mut value, &strip_rx);
                    results.push(json!({ "q": q, "result": value }));
                },
                Err(e) => {
                    results.push(json!({ "q": q, "result": { "error": e.to_string() } }));
                },
            }
        }

        (results, calls, first_timestamp)
    }

    async fn extract(
        &self,
        input: &ResearchInput,
        plan: &PlanResult,
        serper_results: Vec<Value>,
        serper_calls: i64,
        serper_call_timestamp: Option<DateTime<Utc>>,
    ) -> ResearchOutput {
        let evidence_blob = serde_json::to_string(&serper_results).unwrap_or_default();
        let default_emails = extract_emails(&evidence_blob);

        let system = "You are a lead research assistant specializing in finding business decision-makers. \
             Analyze the serper_results (Google search evidence) provided in the user message to identify real \
             people who hold leadership roles at the specified company. Return ONLY a raw JSON object — no \
             markdown fences, no explanation — matching this schema exactly: \
             {people:[{name,title,platform,profile_url,emails_found,confidence}], \
             company:{company_website, company_type, company_address, gmaps_rating, gmaps_reviews}}. \
             If no decision-makers are found, return {people:[], company:{}}.";

        let final_user = json!({
            "company_name": input.company_name,
            "location": input.location,
            "google_maps_url": input.google_maps_url,
            "website": input.website,
            "company_type": input.company_type,
            "platforms": input.platforms,
            "max_people": input.max_people,
            "role_keywords": input.role_keywords,
            "serper_results": serper_results,
            "default_emails": default_emails,
            "constraints": [
                "Never include a person not in serper_results.",
                "Never invent names, titles, emails, or URLs.",
                "Exclude same-name-different-company matches.",
                "De-duplicate at highest confidence.",
                "Title must include at least one role keyword and must not be a staff/support keyword.",
                "Use the exact title wording from evidence.",
                "Prefer LinkedIn URLs.",
            ],
        });

        let (llm_calls, llm_call_timestamp, final_text, final_usage) =
            match self.llm.chat(system, &final_user).await {
                Ok((text, usage)) => (
                    1i64,
                    Some(Utc::now()),
                    text,
                    json!({ "prompt_tokens": usage.prompt_tokens, "completion_tokens": usage.completion_tokens }),
                ),
                Err(e) => (1i64, None, String::new(), json!({ "error": e.to_string() })),
            };

        let payload = extract_json(&final_text).unwrap_or(Value::Null);
        let people_raw = coerce_people_array(&payload);

        let company_obj = payload.get("company").cloned().unwrap_or(Value::Null);
        let company_website = company_obj.get("company_website").and_then(Value::as_str).unwrap_or("").to_string();
        let company_type = company_obj.get("company_type").and_then(Value::as_str).unwrap_or("").to_string();
        let company_address = company_obj.get("company_address").and_then(Value::as_str).unwrap_or("").to_string();
        let gmaps_rating = company_obj.get("gmaps_rating").and_then(Value::as_f64);
        let gmaps_reviews = company_obj.get("gmaps_reviews").and_then(Value::as_i64);

        let mut people: Vec<PersonResult> = people_raw
            .into_iter()
            .map(|item| {
                let mut emails: Vec<String> = item
                    .get("emails_found")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(Value::as_str).map(|s| s.to_lowercase()).collect())
                    .unwrap_or_default();
                if emails.is_empty() {
                    emails = default_emails.clone();
                }

                PersonResult {
                    name: item.get("name").and_then(Value::as_str).unwrap_or("").trim().to_string(),
                    title: item.get("title").and_then(Value::as_str).unwrap_or("").trim().to_string(),
                    platform: item.get("platform").and_then(Value::as_str).unwrap_or("").trim().to_string(),
                    profile_url: item.get("profile_url").and_then(Value::as_str).unwrap_or("").trim().to_string(),
                    confidence: item.get("confidence").and_then(Value::as_str).unwrap_or("LOW").trim().to_string(),
                    reasoning: item.get("reasoning").and_then(Value::as_str).unwrap_or("").trim().to_string(),
                    emails_found: emails,
                    company_website: item
                        .get("company_website")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| company_website.clone()),
                    company_type: item.get("company_type").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| company_type.clone()),
                    company_address: item
                        .get("company_address")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| company_address.clone()),
                    gmaps_rating: item.get("gmaps_rating").and_then(Value::as_f64).or(gmaps_rating),
                    gmaps_reviews: item.get("gmaps_reviews").and_then(Value::as_i64).or(gmaps_reviews),
                }
            })
            .collect();

        people.truncate(input.max_people.max(1));

        let trace = ResearchTrace {
            llm_input: json!({ "plan_messages": plan.plan_messages, "final_messages": { "system": system, "user": final_user } }),
            serper_queries: serper_results.iter().filter_map(|r| r.get("q").and_then(Value::as_str)).map(str::to_string).collect(),
            serper_calls,
            llm_calls,
            llm_call_timestamp,
            serper_call_timestamp,
            llm_usage: json!({ "plan": plan.plan_usage, "final": final_usage }),
            llm_output: json!({ "plan_text": plan.notes, "final_text": final_text }),
        };

        ResearchOutput { people, trace }
    }
}

struct PlanResult {
    queries: Vec<String>,
    notes: String,
    plan_messages: Option<Value>,
    plan_usage: Option<Value>,
}

fn strip_phrase_in_place(value: &mut Value, rx: &regex::Regex) {
    match value {
        Value::String(s) => {
            *s = rx.replace_all(s, "").to_string();
        },
        Value::Array(arr) => {
            for item in arr {
                strip_phrase_in_place(item, rx);
            }
        },
        Value::Object(obj) => {
            for (_, v) in obj.iter_mut() {
                strip_phrase_in_place(v, rx);
            }
        },
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_phrase_removes_decision_maker_case_insensitive() {
        let rx = regex::Regex::new(STRIP_PHRASE_RX_SOURCE).unwrap();
        let mut v = json!({"snippet": "John is a Decision Maker at Acme, a decision-makers hub"});
        strip_phrase_in_place(&mut v, &rx);
        let s = v["snippet"].as_str().unwrap().to_lowercase();
        assert!(!s.contains("decision"));
    }
}
