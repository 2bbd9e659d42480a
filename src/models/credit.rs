use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Why a credit ledger entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MonthlyGrant,
    Topup,
    Spend,
    Refund,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MonthlyGrant => "grant_monthly",
            Self::Topup => "topup",
            Self::Spend => "spend",
            Self::Refund => "refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "grant_monthly" => Some(Self::MonthlyGrant),
            "topup" => Some(Self::Topup),
            "spend" => Some(Self::Spend),
            "refund" => Some(Self::Refund),
            _ => None,
        }
    }
}

/// Append-only record of a credit grant or spend. The ledger, not the
/// cached balance, is the source of truth for how many credits remain.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditLedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub lot_id: Option<String>,
    pub event_type: String,
    pub delta: i64,
    pub source: String,
    pub job_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Option<String>,
}

impl CreditLedgerEntry {
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_str(&self.event_type)
    }
}

/// A single grant lot still available to spend against, ordered by
/// expiry for FIFO consumption.
#[derive(Debug, Clone)]
pub struct CreditLot {
    pub lot_id: String,
    pub remaining: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub id: i64,
}

/// Cached balance for a user, reconciled from the ledger.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditAccount {
    pub user_id: String,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}
