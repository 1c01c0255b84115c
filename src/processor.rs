//! The downstream inference processor.
//!
//! From the gateway's point of view the processor is a black box: it is
//! invoked only after admission, its output is relayed verbatim, and its
//! outcome never feeds back into the ledger. A failure here does not refund
//! the already-spent credit; refunds would reintroduce a second writer to
//! the balance and with it the very race the guarded debit exists to close.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;

/// Errors from the downstream processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The request to the upstream endpoint failed (network, timeout).
    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The upstream endpoint answered with a non-success status.
    #[error("inference endpoint returned status {status}")]
    Status { status: u16, body: String },

    /// Internal error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Opaque downstream computation invoked only after admission.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Run inference on the given text and return the raw result payload.
    async fn process(&self, text: &str) -> Result<Value, ProcessorError>;
}

// ============================================================================
// Production implementation using reqwest
// ============================================================================

/// HTTP processor forwarding to an upstream inference endpoint.
pub struct HttpProcessor {
    client: reqwest::Client,
    url: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpProcessor {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl Processor for HttpProcessor {
    #[tracing::instrument(skip(self, text), fields(text_len = text.len()))]
    async fn process(&self, text: &str) -> Result<Value, ProcessorError> {
        let mut request = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&serde_json::json!({ "text": text }));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "upstream inference call failed");
            return Err(ProcessorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

// ============================================================================
// Test/mock implementation
// ============================================================================

use parking_lot::Mutex;
use std::sync::Arc;

/// Mock processor for testing.
///
/// Returns queued canned results in FIFO order and records every call, so
/// tests can assert that the processor ran (or didn't) without a real
/// upstream.
#[derive(Clone, Default)]
pub struct MockProcessor {
    responses: Arc<Mutex<Vec<Result<Value, ProcessorError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to be returned by the next `process` call.
    pub fn add_response(&self, response: Result<Value, ProcessorError>) {
        self.responses.lock().push(response);
    }

    /// Texts this processor has been invoked with, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Processor for MockProcessor {
    async fn process(&self, text: &str) -> Result<Value, ProcessorError> {
        self.calls.lock().push(text.to_string());

        let mut responses = self.responses.lock();
        if responses.is_empty() {
            return Err(ProcessorError::Other(anyhow::anyhow!(
                "no mock response configured"
            )));
        }
        responses.remove(0)
    }
}
