use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::application::{EmbeddingInput, EmbeddingProvider};
use crate::domain::EngineError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_MS: u64 = 4_000;

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
    input_type: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

/// HTTP client for the embedding provider.
///
/// Each request is bounded at 30 s and retried at most three times with
/// exponential backoff (500 ms base, factor 2, capped at 4 s), and only on
/// transport errors and 5xx responses; 4xx means the request itself is wrong
/// and retrying cannot help. The API key is read from the environment
/// variable named in the semantic configuration.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(
        provider_url: impl Into<String>,
        model: impl Into<String>,
        api_key_env: &str,
    ) -> Self {
        let base: String = provider_url.into();
        let url = format!("{}/embeddings", base.trim_end_matches('/'));
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            url,
            model: model.into(),
            api_key: std::env::var(api_key_env).ok().filter(|k| !k.is_empty()),
        }
    }

    async fn request_once(
        &self,
        texts: &[String],
        input: EmbeddingInput,
    ) -> Result<Vec<Vec<f32>>, RequestFailure> {
        let body = ApiRequest {
            model: &self.model,
            input: texts,
            input_type: input.as_str(),
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            RequestFailure::Transient(format!("transport error: {}", e))
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RequestFailure::Transient(format!("provider returned {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RequestFailure::Fatal(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| RequestFailure::Fatal(format!("malformed response: {}", e)))?;
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }
}

enum RequestFailure {
    Transient(String),
    Fatal(String),
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(
        &self,
        texts: &[String],
        input: EmbeddingInput,
    ) -> Result<Vec<Vec<f32>>, EngineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0u32;
        loop {
            match self.request_once(texts, input).await {
                Ok(embeddings) => {
                    if embeddings.len() != texts.len() {
                        return Err(EngineError::embedding(format!(
                            "provider returned {} embeddings for {} inputs",
                            embeddings.len(),
                            texts.len()
                        )));
                    }
                    return Ok(embeddings);
                }
                Err(RequestFailure::Fatal(reason)) => {
                    return Err(EngineError::embedding(reason));
                }
                Err(RequestFailure::Transient(reason)) => {
                    if attempt >= MAX_RETRIES {
                        return Err(EngineError::embedding(format!(
                            "{} (after {} retries)",
                            reason, MAX_RETRIES
                        )));
                    }
                    let backoff =
                        (BACKOFF_BASE_MS << attempt).min(BACKOFF_MAX_MS);
                    warn!(
                        "Embedding request failed ({}); retrying in {} ms",
                        reason, backoff
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for HttpEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose whether a key is set beyond a boolean.
        f.debug_struct("HttpEmbeddingProvider")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}
