use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a submitted research job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Why a job left the processing state without simply completing clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    CreditsExhausted,
    MissingUser,
    CompanyError,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditsExhausted => "credits_exhausted",
            Self::MissingUser => "missing_user",
            Self::CompanyError => "company_error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "credits_exhausted" => Some(Self::CreditsExhausted),
            "missing_user" => Some(Self::MissingUser),
            "company_error" => Some(Self::CompanyError),
            _ => None,
        }
    }
}

/// One submitted research run: an uploaded company list plus run-level
/// counters and cost accounting, updated as the job runner progresses.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: i64,
    pub user_id: String,
    pub support_id: String,
    pub filename: String,
    pub status: String,
    pub total_companies: i64,
    pub processed_companies: i64,
    pub decision_makers_found: i64,
    pub credits_spent: i64,
    pub stop_reason: Option<String>,
    pub column_mappings: String,
    pub companies_data: String,
    pub selected_platforms: String,
    pub options: String,
    pub llm_calls_started: i64,
    pub llm_calls_succeeded: i64,
    pub serper_calls: i64,
    pub llm_prompt_tokens: i64,
    pub llm_completion_tokens: i64,
    pub llm_total_tokens: i64,
    pub llm_cost_usd: f64,
    pub serper_cost_usd: f64,
    pub total_cost_usd: f64,
    pub cost_per_contact_usd: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_str(&self.status)
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason.as_deref().and_then(StopReason::from_str)
    }
}

/// A row of the uploaded company list, after column-mapping normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRow {
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub company_type: Option<String>,
}

/// Per-job options controlling search depth and title filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub deep_search: bool,
    pub job_titles: Vec<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self { deep_search: false, job_titles: Vec::new() }
    }
}
