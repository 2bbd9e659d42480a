use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Job, JobOptions, JobStatus};
use crate::utils::CoreError;
use crate::AppState;

/// Job submission contract: an uploaded company list plus the column
/// mappings needed to read it and the platform/depth options that
/// shape the research pipeline.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub user_id: String,
    pub filename: String,
    pub column_mappings: HashMap<String, String>,
    pub rows: Vec<Value>,
    #[serde(default = "default_platforms")]
    pub selected_platforms: Vec<String>,
    #[serde(default)]
    pub options: JobOptions,
}

fn default_platforms() -> Vec<String> {
    vec!["linkedin".to_string()]
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub id: i64,
    pub support_id: String,
    pub status: String,
}

/// Persist a new job in `queued` and hand it to the job runner on a
/// detached task; the caller polls `get_job` for progress.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>, CoreError> {
    if req.user_id.trim().is_empty() {
        return Err(CoreError::invalid_input("user_id must not be empty"));
    }

    let support_id = Uuid::new_v4().simple().to_string()[..12].to_string();
    let companies_data = serde_json::to_string(&req.rows).unwrap_or_else(|_| "[]".to_string());
    let column_mappings = serde_json::to_string(&req.column_mappings).unwrap_or_else(|_| "{}".to_string());
    let selected_platforms = serde_json::to_string(&req.selected_platforms).unwrap_or_else(|_| "[]".to_string());
    let options = serde_json::to_string(&req.options).unwrap_or_else(|_| "{}".to_string());

    let result = sqlx::query(
        "INSERT INTO jobs (user_id, support_id, filename, status, total_companies, column_mappings, \
         companies_data, selected_platforms, options) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&req.user_id)
    .bind(&support_id)
    .bind(&req.filename)
    .bind(JobStatus::Queued.as_str())
    .bind(req.rows.len() as i64)
    .bind(column_mappings)
    .bind(companies_data)
    .bind(selected_platforms)
    .bind(options)
    .execute(&state.db)
    .await?;

    let job_id = result.last_insert_rowid();

    tracing::info!(job_id, support_id = %support_id, "job submitted");

    let runner = Arc::clone(&state.runner);
    tokio::spawn(async move {
        if let Err(e) = runner.run(job_id).await {
            tracing::error!(job_id, error = %e, "job runner failed");
        }
    });

    Ok(Json(SubmitJobResponse { id: job_id, support_id, status: JobStatus::Queued.as_str().to_string() }))
}

/// Poll a job's current status and counters.
pub async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<i64>) -> Result<Json<Job>, CoreError> {
    let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("job {job_id}")))?;

    Ok(Json(job))
}

/// Flip a job to `cancelled`; the runner polls this at each batch
/// boundary and stops without further state changes once set.
pub async fn cancel_job(State(state): State<Arc<AppState>>, Path(job_id): Path<i64>) -> Result<Json<Job>, CoreError> {
    let existing = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("job {job_id}")))?;

    if matches!(existing.status(), Some(JobStatus::Completed) | Some(JobStatus::Failed) | Some(JobStatus::Cancelled)) {
        return Ok(Json(existing));
    }

    sqlx::query("UPDATE jobs SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(JobStatus::Cancelled.as_str())
        .bind(job_id)
        .execute(&state.db)
        .await?;

    tracing::info!(job_id, "job cancelled");

    let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?").bind(job_id).fetch_one(&state.db).await?;
    Ok(Json(job))
}
