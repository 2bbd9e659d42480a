pub mod jobs;

pub use jobs::{cancel_job, get_job, submit_job};
