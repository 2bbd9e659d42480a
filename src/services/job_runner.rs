//! Job Runner: drives one submitted job from `queued` to a terminal
//! status, fanning rows out across a bounded pool of concurrent row
//! pipelines and committing one batch at a time.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;

use super::costs::{JobCostInputs, compute_job_cost_fields};
use super::credits::CreditEngine;
use super::normalize::{RawRowFields, ResolvedRow, resolve_for_save};
use super::research::{PersonResult, ResearchInput, ResearchPipeline, ResearchTrace};
use super::rules::{decision_maker_query_keywords, is_decision_maker_title, title_matches_keywords};
use crate::models::{JobOptions, JobStatus, StopReason};
use crate::utils::CoreError;

const DEFAULT_MAX_PEOPLE: usize = 25;
const SEARCH_LIMIT: usize = 3;

const NAME_PLACEHOLDERS: &[&str] = &["unknown", "n/a", "na", "-", "john doe", "jane doe"];
const HALLUCINATION_PROFILE_FRAGMENTS: &[&str] = &["linkedin.com/in/johndoe", "linkedin.com/in/janedoe"];

pub struct JobRunner {
    pool: SqlitePool,
    pipeline: Arc<ResearchPipeline>,
    credits: Arc<CreditEngine>,
    job_concurrency: usize,
    max_people_per_company: usize,
    input_cost_per_m_usd: f64,
    output_cost_per_m_usd: f64,
    serper_cost_per_1k_usd: f64,
}

struct RowOutcome {
    usable: bool,
    decision_makers: Vec<PersonResult>,
    llm_calls: i64,
    serper_calls: i64,
    prompt_tokens: i64,
    completion_tokens: i64,
    trace: Option<ResearchTrace>,
    resolved: ResolvedRow,
}

impl JobRunner {
    pub fn new(
        pool: SqlitePool,
        pipeline: Arc<ResearchPipeline>,
        credits: Arc<CreditEngine>,
        job_concurrency: usize,
        max_people_per_company: usize,
        input_cost_per_m_usd: f64,
        output_cost_per_m_usd: f64,
        serper_cost_per_1k_usd: f64,
    ) -> Self {
        Self {
            pool,
            pipeline,
            credits,
            job_concurrency: job_concurrency.clamp(1, 500),
            max_people_per_company: max_people_per_company.clamp(1, 100),
            input_cost_per_m_usd,
            output_cost_per_m_usd,
            serper_cost_per_1k_usd,
        }
    }

    /// Drive `job_id` from its current state to a terminal status.
    /// Assumes the job was created in `queued` by the submit operation.
    pub async fn run(&self, job_id: i64) -> Result<(), CoreError> {
        let row: (String, String) = sqlx::query_as("SELECT status, user_id FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("job {job_id}")))?;

        if row.0 == JobStatus::Cancelled.as_str() {
            return Ok(());
        }

        if row.1.trim().is_empty() {
            sqlx::query("UPDATE jobs SET status = ?, stop_reason = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
                .bind(JobStatus::Failed.as_str())
                .bind(StopReason::MissingUser.as_str())
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        sqlx::query("UPDATE jobs SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(JobStatus::Processing.as_str())
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        let job_row: (String, String, String, String, String) = sqlx::query_as(
            "SELECT user_id, companies_data, column_mappings, options, selected_platforms FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;

        let (user_id, companies_data, column_mappings, options_json, selected_platforms_json) = job_row;

        let rows: Vec<Value> = serde_json::from_str(&companies_data).unwrap_or_default();
        let mappings: std::collections::HashMap<String, String> =
            serde_json::from_str(&column_mappings).unwrap_or_default();
        let options: JobOptions = serde_json::from_str(&options_json).unwrap_or_default();
        let platforms: Vec<String> =
            serde_json::from_str(&selected_platforms_json).unwrap_or_else(|_| vec!["linkedin".to_string()]);

        let role_keywords: Vec<String> = {
            let supplied: Vec<String> =
                options.job_titles.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).take(5).collect();
            if supplied.is_empty() { decision_maker_query_keywords().into_iter().take(5).collect() } else { supplied }
        };

        if let Err(e) = self.run_rows(job_id, &user_id, &rows, &mappings, &options, &platforms, &role_keywords).await {
            sqlx::query("UPDATE jobs SET status = ?, stop_reason = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
                .bind(JobStatus::Failed.as_str())
                .bind(StopReason::CompanyError.as_str())
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            return Err(e);
        }

        Ok(())
    }

    async fn run_rows(
        &self,
        job_id: i64,
        user_id: &str,
        rows: &[Value],
        mappings: &std::collections::HashMap<String, String>,
        options: &JobOptions,
        platforms: &[String],
        role_keywords: &[String],
    ) -> Result<(), CoreError> {
        for batch in rows.chunks(self.job_concurrency) {
            let current_status: (String,) =
                sqlx::query_as("SELECT status FROM jobs WHERE id = ?").bind(job_id).fetch_one(&self.pool).await?;
            if current_status.0 == JobStatus::Cancelled.as_str() {
                return Ok(());
            }

            let concurrency = self.job_concurrency;
            let outcomes: Vec<RowOutcome> = stream::iter(batch.iter().cloned())
                .map(|row| self.process_row(row, mappings, options, platforms, role_keywords))
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let mut tx = self.pool.begin().await?;
            let mut stop_reason: Option<StopReason> = None;

            for outcome in outcomes {
                sqlx::query(
                    "UPDATE jobs SET \
                     llm_calls_started = llm_calls_started + ?, llm_calls_succeeded = llm_calls_succeeded + ?, \
                     serper_calls = serper_calls + ?, llm_prompt_tokens = llm_prompt_tokens + ?, \
                     llm_completion_tokens = llm_completion_tokens + ?, \
                     llm_total_tokens = llm_total_tokens + ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                )
                .bind(outcome.llm_calls)
                .bind(if outcome.trace.is_some() { outcome.llm_calls } else { 0 })
                .bind(outcome.serper_calls)
                .bind(outcome.prompt_tokens)
                .bind(outcome.completion_tokens)
                .bind(outcome.prompt_tokens + outcome.completion_tokens)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;

                if !outcome.usable || outcome.decision_makers.is_empty() {
                    sqlx::query("UPDATE jobs SET processed_companies = processed_companies + 1 WHERE id = ?")
                        .bind(job_id)
                        .execute(&mut *tx)
                        .await?;
                    continue;
                }

                match self.credits.spend(user_id, 1, job_id, "job").await {
                    Ok(()) => {},
                    Err(CoreError::InsufficientCredits) => {
                        stop_reason = Some(StopReason::CreditsExhausted);
                        break;
                    },
                    Err(e) => return Err(e),
                }

                sqlx::query("UPDATE jobs SET processed_companies = processed_companies + 1, credits_spent = credits_spent + 1 WHERE id = ?")
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;

                for person in &outcome.decision_makers {
                    let uploaded = serde_json::to_string(&serde_json::json!({
                        "company_name": outcome.resolved.company_name,
                        "company_type": outcome.resolved.company_type,
                        "company_city": outcome.resolved.company_city,
                        "company_country": outcome.resolved.company_country,
                        "company_website": outcome.resolved.company_website,
                    }))
                    .unwrap_or_default();
                    let trace = outcome.trace.as_ref();
                    let llm_input = trace.map(|t| t.llm_input.to_string()).unwrap_or_default();
                    let serper_queries = trace.map(|t| serde_json::to_string(&t.serper_queries).unwrap_or_default()).unwrap_or_default();
                    let llm_output = trace.map(|t| t.llm_output.to_string()).unwrap_or_default();
                    let emails_found = person.emails_found.join(",");

                    sqlx::query(
                        "INSERT INTO decision_makers (job_id, user_id, company_name, company_type, company_city, \
                         company_country, company_website, company_address, gmaps_rating, gmaps_reviews, name, \
                         title, platform, profile_url, emails_found, confidence_score, reasoning, \
                         uploaded_company_data, llm_input, serper_queries, llm_output, llm_call_timestamp, \
                         serper_call_timestamp) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(job_id)
                    .bind(user_id)
                    .bind(&outcome.resolved.company_name)
                    .bind(&person.company_type)
                    .bind(&outcome.resolved.company_city)
                    .bind(&outcome.resolved.company_country)
                    .bind(&person.company_website)
                    .bind(&person.company_address)
                    .bind(person.gmaps_rating)
                    .bind(person.gmaps_reviews)
                    .bind(&person.name)
                    .bind(&person.title)
                    .bind(&person.platform)
                    .bind(&person.profile_url)
                    .bind(emails_found)
                    .bind(&person.confidence)
                    .bind(&person.reasoning)
                    .bind(uploaded)
                    .bind(llm_input)
                    .bind(serper_queries)
                    .bind(llm_output)
                    .bind(trace.and_then(|t| t.llm_call_timestamp))
                    .bind(trace.and_then(|t| t.serper_call_timestamp))
                    .execute(&mut *tx)
                    .await?;
                }

                sqlx::query("UPDATE jobs SET decision_makers_found = decision_makers_found + ? WHERE id = ?")
                    .bind(outcome.decision_makers.len() as i64)
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
            }

            self.update_cost_fields(&mut tx, job_id).await?;
            tx.commit().await?;

            if let Some(reason) = stop_reason {
                sqlx::query("UPDATE jobs SET status = ?, stop_reason = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
                    .bind(JobStatus::Completed.as_str())
                    .bind(reason.as_str())
                    .bind(job_id)
                    .execute(&self.pool)
                    .await?;
                return Ok(());
            }
        }

        let final_status: (String,) =
            sqlx::query_as("SELECT status FROM jobs WHERE id = ?").bind(job_id).fetch_one(&self.pool).await?;
        if final_status.0 == JobStatus::Processing.as_str() {
            sqlx::query("UPDATE jobs SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
                .bind(JobStatus::Completed.as_str())
                .bind(job_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    async fn update_cost_fields(&self, tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, job_id: i64) -> Result<(), CoreError> {
        let counters: (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT llm_prompt_tokens, llm_completion_tokens, serper_calls, decision_makers_found FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_one(&mut **tx)
        .await?;

        let fields = compute_job_cost_fields(&JobCostInputs {
            llm_prompt_tokens: counters.0,
            llm_completion_tokens: counters.1,
            serper_calls: counters.2,
            contacts_found: counters.3,
            input_cost_per_m: self.input_cost_per_m_usd,
            output_cost_per_m: self.output_cost_per_m_usd,
            serper_cost_per_1k: self.serper_cost_per_1k_usd,
        });

        sqlx::query(
            "UPDATE jobs SET llm_cost_usd = ?, serper_cost_usd = ?, total_cost_usd = ?, cost_per_contact_usd = ? WHERE id = ?",
        )
        .bind(fields.llm_cost_usd)
        .bind(fields.serper_cost_usd)
        .bind(fields.total_cost_usd)
        .bind(fields.cost_per_contact_usd)
        .bind(job_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn process_row(
        &self,
        row: Value,
        mappings: &std::collections::HashMap<String, String>,
        options: &JobOptions,
        platforms: &[String],
        role_keywords: &[String],
    ) -> RowOutcome {
        let get_field = |semantic_key: &str| -> Option<String> {
            let header = mappings.get(semantic_key)?;
            row.get(header).and_then(Value::as_str).map(str::to_string)
        };

        let raw = RawRowFields {
            company_name: get_field("company_name"),
            location: get_field("location"),
            google_maps_url: get_field("google_maps_url"),
            website: get_field("website"),
            industry: get_field("industry"),
            city: get_field("city"),
            country: get_field("country"),
        };

        let resolved = resolve_for_save(&raw);

        if resolved.company_name.is_empty() {
            return RowOutcome {
                usable: false,
                decision_makers: Vec::new(),
                llm_calls: 0,
                serper_calls: 0,
                prompt_tokens: 0,
                completion_tokens: 0,
                trace: None,
                resolved,
            };
        }

        let effective_platforms: Vec<String> = if options.deep_search { platforms.to_vec() } else { Vec::new() };

        let input = ResearchInput {
            company_name: resolved.company_name.clone(),
            location: Some(resolved.location_hint.clone()).filter(|s| !s.is_empty()),
            google_maps_url: raw.google_maps_url.clone(),
            website: Some(resolved.company_website.clone()).filter(|s| !s.is_empty()),
            company_type: Some(resolved.company_type.clone()).filter(|s| !s.is_empty()),
            platforms: effective_platforms,
            max_people: self.max_people_per_company.min(DEFAULT_MAX_PEOPLE).max(1),
            deep_search: options.deep_search,
            role_keywords: role_keywords.to_vec(),
            max_search_calls: SEARCH_LIMIT,
        };

        let output = self.pipeline.research(&input).await;

        let has_filter = !options.job_titles.is_empty();
        let valid_people: Vec<PersonResult> = output
            .people
            .into_iter()
            .filter(|p| !is_rejected_name(&p.name))
            .filter(|p| !is_rejected_profile(&p.profile_url))
            .filter(|p| {
                if has_filter { title_matches_keywords(Some(&p.title), role_keywords) } else { is_decision_maker_title(Some(&p.title)).0 }
            })
            .collect();

        RowOutcome {
            usable: true,
            decision_makers: valid_people,
            llm_calls: output.trace.llm_calls,
            serper_calls: output.trace.serper_calls,
            prompt_tokens: extract_usage_tokens(&output.trace.llm_usage, "prompt_tokens"),
            completion_tokens: extract_usage_tokens(&output.trace.llm_usage, "completion_tokens"),
            trace: Some(output.trace),
            resolved,
        }
    }
}

fn is_rejected_name(name: &str) -> bool {
    let n = name.trim();
    n.is_empty() || NAME_PLACEHOLDERS.contains(&n.to_lowercase().as_str())
}

fn is_rejected_profile(profile_url: &str) -> bool {
    let lower = profile_url.to_lowercase();
    HALLUCINATION_PROFILE_FRAGMENTS.iter().any(|frag| lower.contains(frag))
}

fn extract_usage_tokens(usage: &Value, field: &str) -> i64 {
    usage.get("plan").and_then(|v| v.get(field)).and_then(Value::as_i64).unwrap_or(0)
        + usage.get("final").and_then(|v| v.get(field)).and_then(Value::as_i64).unwrap_or(0)
}
