use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Billing plans, and the monthly credit grant each one carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKey {
    Trial,
    Entry,
    Pro,
    Business,
    Agency,
}

impl PlanKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Entry => "entry",
            Self::Pro => "pro",
            Self::Business => "business",
            Self::Agency => "agency",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "trial" => Some(Self::Trial),
            "entry" => Some(Self::Entry),
            "pro" => Some(Self::Pro),
            "business" => Some(Self::Business),
            "agency" => Some(Self::Agency),
            _ => None,
        }
    }

    /// Monthly credit grant for this plan. Unknown plan keys grant zero,
    /// mirroring the lookup-with-default behavior of the original table.
    pub fn monthly_credits(&self) -> i64 {
        match self {
            Self::Trial => 20,
            Self::Entry => 7_250,
            Self::Pro => 26_000,
            Self::Business => 80_000,
            Self::Agency => 249_000,
        }
    }
}

/// Plan binding for a user. The job runner and credit engine consult
/// this only to know which monthly grant amount applies.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub user_id: String,
    pub plan_key: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub provider: Option<String>,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn plan_key(&self) -> Option<PlanKey> {
        PlanKey::from_str(&self.plan_key)
    }
}
