//! HTTP embedding client
//!
//! Speaks the common `/v1/embeddings` wire shape. Each input is truncated at
//! this boundary, requests are batched under the provider cap, in-flight
//! requests are bounded by a semaphore, and transient failures retry with
//! exponential backoff before surfacing `EmbeddingUnavailable`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::errors::CoreError;
use crate::text;

/// Connection settings for the embedding provider.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    /// Endpoint, e.g. "https://api.openai.com/v1/embeddings"
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// Fixed output dimension requested from the provider
    pub dimension: usize,
    /// Truncation applied to every input before dispatch
    pub max_chars: usize,
    /// Inputs per request
    pub batch_size: usize,
    /// In-flight request cap
    pub concurrency: usize,
    /// Attempts per batch (first try plus retries)
    pub attempts: u32,
    pub request_timeout: Duration,
}

impl HttpEmbeddingConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension: 1536,
            max_chars: 16_000,
            batch_size: 64,
            concurrency: 16,
            attempts: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

/// Reqwest-backed `EmbeddingProvider`.
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    config: HttpEmbeddingConfig,
    permits: Arc<Semaphore>,
}

impl HttpEmbeddingClient {
    pub fn new(config: HttpEmbeddingConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self { http, config, permits }
    }

    async fn dispatch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CoreError::EmbeddingUnavailable("client shut down".into()))?;

        let mut last_error = String::new();
        for attempt in 0..self.config.attempts {
            if attempt > 0 {
                let backoff = Duration::from_millis(250 * (1 << attempt));
                debug!(attempt, ?backoff, "retrying embedding request");
                tokio::time::sleep(backoff).await;
            }
            match self.try_once(inputs).await {
                Ok(rows) => return Ok(rows),
                Err(RequestFault::Permanent(msg)) => {
                    return Err(CoreError::EmbeddingUnavailable(msg));
                }
                Err(RequestFault::Transient(msg)) => {
                    warn!(attempt, error = %msg, "embedding request failed");
                    last_error = msg;
                }
            }
        }
        Err(CoreError::EmbeddingUnavailable(format!(
            "provider failed after {} attempts: {last_error}",
            self.config.attempts
        )))
    }

    async fn try_once(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RequestFault> {
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: inputs,
            dimensions: self.config.dimension,
        };
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RequestFault::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(RequestFault::Transient(format!("provider status {status}")));
        }
        if !status.is_success() {
            return Err(RequestFault::Permanent(format!("provider status {status}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RequestFault::Transient(format!("malformed response: {e}")))?;

        if parsed.data.len() != inputs.len() {
            return Err(RequestFault::Permanent(format!(
                "provider returned {} rows for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        for row in &parsed.data {
            if row.embedding.len() != self.config.dimension {
                return Err(RequestFault::Permanent(format!(
                    "provider returned dimension {} (expected {})",
                    row.embedding.len(),
                    self.config.dimension
                )));
            }
        }
        Ok(parsed.data.into_iter().map(|r| r.embedding).collect())
    }
}

enum RequestFault {
    Transient(String),
    Permanent(String),
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // The only truncation point in the engine.
        let truncated: Vec<String> = texts
            .iter()
            .map(|t| text::embed_truncate(t, self.config.max_chars).to_string())
            .collect();

        let mut out = Vec::with_capacity(texts.len());
        for batch in truncated.chunks(self.config.batch_size.max(1)) {
            out.extend(self.dispatch(batch).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
