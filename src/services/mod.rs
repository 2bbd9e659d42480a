pub mod costs;
pub mod credits;
pub mod job_runner;
pub mod llm;
pub mod normalize;
pub mod research;
pub mod rules;
pub mod search;

pub use credits::CreditEngine;
pub use job_runner::JobRunner;
pub use research::{PersonResult, ResearchInput, ResearchOutput, ResearchPipeline, ResearchTrace};
pub use search::{SearchClient, SearchQuery};
