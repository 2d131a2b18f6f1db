//! Gemini-backed query generation
//!
//! One POST per run. The model is asked for a JSON array of query strings
//! but free-form answers are tolerated: parsing falls back to treating each
//! non-empty line of the raw text as one query.

use std::time::Duration;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{QueryError, QuerySource};

const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent";

/// Client for the Gemini generative-text endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GeminiClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: GEMINI_ENDPOINT.to_string(),
        }
    }

    /// Override the endpoint (tests, self-hosted gateways)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_prompt(topics: &[String], count: usize) -> String {
        format!(
            "Generate exactly {} unique, diverse, and realistic search queries. \
             Each query should be related to one or more of these topics: {}. \
             Return the results as a JSON array of strings.",
            count,
            topics.join(", ")
        )
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuerySource for GeminiClient {
    async fn generate(
        &self,
        topics: &[String],
        count: usize,
        api_key: &str,
    ) -> Result<Vec<String>, QueryError> {
        let prompt = Self::build_prompt(topics, count);
        debug!("Requesting {} queries for topics {:?} (key: {}...)",
            count, topics, crate::safe_truncate(api_key, 6));

        let body = serde_json::json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| QueryError::GenerationFailed(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(QueryError::GenerationFailed(format!(
                "API request failed with status {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QueryError::GenerationFailed(format!("Failed to parse response: {}", e)))?;

        let text = data
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| QueryError::GenerationFailed("Invalid API response".into()))?;

        let queries = parse_queries(text, count);
        if queries.is_empty() {
            warn!("Query source returned text but no parsable queries");
            return Err(QueryError::NoQueries);
        }

        Ok(queries)
    }
}

/// Parse free-form model output into a sequence of queries.
///
/// Strict structured parse first, then an embedded-array slice, then one
/// query per non-empty line. Result is truncated to `count`.
pub fn parse_queries(text: &str, count: usize) -> Vec<String> {
    let stripped = strip_code_fences(text);

    if let Ok(queries) = serde_json::from_str::<Vec<String>>(stripped.trim()) {
        return take_clean(queries, count);
    }

    // The array is often embedded in surrounding prose
    if let (Some(start), Some(end)) = (stripped.find('['), stripped.rfind(']')) {
        if start < end {
            if let Ok(queries) = serde_json::from_str::<Vec<String>>(&stripped[start..=end]) {
                return take_clean(queries, count);
            }
        }
    }

    let lines = stripped
        .lines()
        .map(strip_list_prefix)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    take_clean(lines, count)
}

fn take_clean(queries: Vec<String>, count: usize) -> Vec<String> {
    queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(count)
        .collect()
}

/// Strip Markdown code fences around the payload, if present
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Trim list markers ("1.", "2)", "-", "*") and stray quotes from a line
fn strip_list_prefix(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['.', ')'])
        .trim_start_matches(['-', '*'])
        .trim();
    line.trim_matches(['"', ','])
}
