use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// How confident the extraction pipeline is in a given contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceScore {
    High,
    Medium,
    Low,
}

impl ConfidenceScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// A validated decision-maker contact surfaced for one company within a job.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DecisionMaker {
    pub id: i64,
    pub job_id: i64,
    pub user_id: String,
    pub company_name: String,
    pub company_type: String,
    pub company_city: String,
    pub company_country: String,
    pub company_website: String,
    pub company_address: String,
    pub gmaps_rating: Option<f64>,
    pub gmaps_reviews: Option<i64>,
    pub name: String,
    pub title: String,
    pub platform: String,
    pub profile_url: String,
    pub emails_found: String,
    pub confidence_score: String,
    pub reasoning: String,
    pub uploaded_company_data: String,
    pub llm_input: String,
    pub serper_queries: String,
    pub llm_output: String,
    pub llm_call_timestamp: Option<DateTime<Utc>>,
    pub serper_call_timestamp: Option<DateTime<Utc>>,
}
