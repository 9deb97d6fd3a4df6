//! Cross-encoder reranker port
//!
//! The reranker scores `(query, passage)` pairs jointly and returns raw
//! model outputs; calibration to a confidence happens in the retriever.
//! The handle is constructed once at startup and shared immutably.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score each passage against the query. One raw score per passage, in
    /// passage order. Faults surface as `RerankerUnavailable`; callers fall
    /// back to vector ordering.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f64>, CoreError>;
}

/// Connection settings for an out-of-process cross-encoder service.
#[derive(Debug, Clone)]
pub struct HttpRerankerConfig {
    pub endpoint: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl HttpRerankerConfig {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    passages: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f64>,
}

/// Reqwest-backed reranker adapter.
///
/// Inference runs out of process; this client only moves pairs and scores,
/// so it stays on the cooperative scheduler. An in-process model would need
/// `spawn_blocking` around its forward pass instead.
pub struct HttpReranker {
    http: reqwest::Client,
    config: HttpRerankerConfig,
}

impl HttpReranker {
    pub fn new(config: HttpRerankerConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { http, config }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f64>, CoreError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let body = RerankRequest {
            model: &self.config.model,
            query,
            passages,
        };
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::RerankerUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::RerankerUnavailable(format!(
                "reranker status {}",
                response.status()
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| CoreError::RerankerUnavailable(format!("malformed response: {e}")))?;

        if parsed.scores.len() != passages.len() {
            return Err(CoreError::RerankerUnavailable(format!(
                "reranker returned {} scores for {} passages",
                parsed.scores.len(),
                passages.len()
            )));
        }
        Ok(parsed.scores)
    }
}
