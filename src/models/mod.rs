pub mod credit;
pub mod decision_maker;
pub mod job;
pub mod subscription;

pub use credit::{CreditAccount, CreditLedgerEntry, CreditLot, EventType};
pub use decision_maker::{ConfidenceScore, DecisionMaker};
pub use job::{CompanyRow, Job, JobOptions, JobStatus, StopReason};
pub use subscription::{PlanKey, Subscription};
