pub mod cache_key;
pub mod error;
pub mod json_extract;

pub use cache_key::{cache_key, canonical_json};
pub use error::{CoreError, CoreResult};
pub use json_extract::{coerce_people_array, extract_json};
