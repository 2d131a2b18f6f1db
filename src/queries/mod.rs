//! Search query generation
//!
//! Turns a topic selection into a sequence of search strings via an
//! external text-generation endpoint.

mod gemini;

pub use gemini::{GeminiClient, parse_queries};

use async_trait::async_trait;
use thiserror::Error;

/// Query generation errors
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query generation failed: {0}")]
    GenerationFailed(String),

    #[error("Query source produced no queries")]
    NoQueries,
}

/// Source of search queries for a run.
///
/// Implementations may return fewer entries than requested; callers must
/// not assume exact cardinality.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn generate(
        &self,
        topics: &[String],
        count: usize,
        api_key: &str,
    ) -> Result<Vec<String>, QueryError>;
}
