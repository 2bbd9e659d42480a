pub mod backoff;
pub mod client;
pub mod types;

pub use client::{LlmClient, LlmClientConfig};
pub use types::Usage;
