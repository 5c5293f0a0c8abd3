//! Hosted embedding API provider (Gemini `batchEmbedContents`).
//!
//! Texts are sent in batches of `batch_size`. Transient failures (connection
//! errors, timeouts, HTTP 429 and 5xx) are retried with exponential backoff up
//! to `max_retries` times; any other failure surfaces as a provider error.
//! Nothing is cached.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

const BASE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct RemoteEmbeddingProvider {
    endpoint: String,
    model: String,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    /// Per-request timeout; `None` when `timeout_secs` is 0.
    timeout: Option<Duration>,
    // Built on first use: a blocking client cannot be created on an async worker thread.
    client: Mutex<Option<reqwest::blocking::Client>>,
    dims: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Outcome of one HTTP attempt.
enum Attempt {
    Done(Vec<Vec<f32>>),
    Retry(RagError),
    Fail(RagError),
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RagError::Config(
                    "remote embedding API key not configured (set embedding.api_key or GEMINI_API_KEY)"
                        .into(),
                )
            })?;
        if config.batch_size == 0 {
            return Err(RagError::Config("embedding.batch_size must be at least 1".into()));
        }

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.remote_model,
            batch_size = config.batch_size,
            "remote embedding provider configured"
        );

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.remote_model.clone(),
            api_key,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
            client: Mutex::new(None),
            dims: AtomicUsize::new(0),
        })
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        let mut slot = self
            .client
            .lock()
            .map_err(|e| RagError::Provider(format!("client lock poisoned: {e}")))?;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn url(&self) -> String {
        format!("{}/models/{}:batchEmbedContents", self.endpoint, self.model)
    }

    fn embed_chunk(&self, client: &reqwest::blocking::Client, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = batch_request(&self.model, texts);
        let mut attempt = 0u32;
        loop {
            match self.send(client, &body, texts.len()) {
                Attempt::Done(vectors) => return Ok(vectors),
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry(err) if attempt >= self.max_retries => return Err(err),
                Attempt::Retry(err) => {
                    let delay = backoff(attempt);
                    tracing::warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "embedding request failed, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    fn send(&self, client: &reqwest::blocking::Client, body: &serde_json::Value, expected: usize) -> Attempt {
        let response = match client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                return Attempt::Retry(RagError::Http(e))
            }
            Err(e) => return Attempt::Fail(RagError::Http(e)),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let err = RagError::Provider(format!("embedding API returned {status}: {text}"));
            return if is_retryable(status) {
                Attempt::Retry(err)
            } else {
                Attempt::Fail(err)
            };
        }

        match response.bytes() {
            Ok(bytes) => match parse_batch_response(&bytes, expected) {
                Ok(vectors) => Attempt::Done(vectors),
                Err(e) => Attempt::Fail(e),
            },
            Err(e) => Attempt::Retry(RagError::Http(e)),
        }
    }

    fn check_dims(&self, vectors: &[Vec<f32>]) -> Result<()> {
        for v in vectors {
            // The first vector seen fixes the width for the provider's lifetime.
            let known = match self
                .dims
                .compare_exchange(0, v.len(), Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => v.len(),
                Err(current) => current,
            };
            if known != v.len() {
                return Err(RagError::DimensionMismatch {
                    expected: known,
                    actual: v.len(),
                });
            }
        }
        Ok(())
    }
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Provider("embedding API returned no vectors".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let client = self.client()?;
        let mut out = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!(batch = i, size = batch.len(), "requesting remote embeddings");
            let vectors = self.embed_chunk(&client, batch)?;
            self.check_dims(&vectors)?;
            out.extend(vectors);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dims.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        "remote-api"
    }
}

fn batch_request(model: &str, texts: &[&str]) -> serde_json::Value {
    let requests: Vec<serde_json::Value> = texts
        .iter()
        .map(|text| {
            serde_json::json!({
                "model": format!("models/{model}"),
                "content": { "parts": [{ "text": text }] },
            })
        })
        .collect();
    serde_json::json!({ "requests": requests })
}

fn parse_batch_response(bytes: &[u8], expected: usize) -> Result<Vec<Vec<f32>>> {
    let parsed: BatchEmbedResponse = serde_json::from_slice(bytes)?;
    if parsed.embeddings.len() != expected {
        return Err(RagError::Provider(format!(
            "embedding API returned {} vectors for {expected} inputs",
            parsed.embeddings.len()
        )));
    }
    Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.saturating_pow(attempt.min(6))
}
