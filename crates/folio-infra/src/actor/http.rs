//! HTTP transport to a remote counter service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use folio_core::domain::{CounterOp, CounterReply};
use folio_core::error::CounterError;
use folio_core::ports::CounterActor;
use folio_shared::ErrorResponse;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpCounterConfig {
    /// Base URL of the counter service (e.g., http://127.0.0.1:8787)
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpCounterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            timeout: Duration::from_millis(2000),
        }
    }
}

impl HttpCounterConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("COUNTER_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8787".to_string()),
            timeout: Duration::from_millis(
                std::env::var("COUNTER_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
        }
    }
}

/// Counter actor reached over `POST /api/counters/{key}`.
pub struct HttpCounterClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpCounterClient {
    pub fn new(config: HttpCounterConfig) -> Result<Self, CounterError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CounterError::InvalidInput(format!("bad counter service URL {}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CounterError::InvalidInput(format!(
                "counter service URL {} cannot carry a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CounterError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout: config.timeout,
        })
    }

    /// Create from environment configuration.
    pub fn from_env() -> Result<Self, CounterError> {
        Self::new(HttpCounterConfig::from_env())
    }

    fn endpoint(&self, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            // Each part is percent-encoded as a single segment.
            segments.pop_if_empty().extend(["api", "counters", key]);
        }
        url
    }

    fn transport_error(&self, error: reqwest::Error) -> CounterError {
        if error.is_timeout() {
            CounterError::Timeout(self.timeout)
        } else {
            CounterError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl CounterActor for HttpCounterClient {
    async fn call(&self, key: &str, op: CounterOp) -> Result<CounterReply, CounterError> {
        let response = self
            .client
            .post(self.endpoint(key))
            .json(&op)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .unwrap_or_else(|| status.to_string());
            return Err(CounterError::InvalidInput(detail));
        }
        if !status.is_success() {
            tracing::warn!(key = %key, status = %status, "Counter service returned an error");
            return Err(CounterError::Transport(format!(
                "counter service returned {status}"
            )));
        }

        // The reply shape is fixed by the operation that was sent.
        let reply = match op {
            CounterOp::IncrementWindow { .. } => {
                CounterReply::Window(response.json().await.map_err(|e| self.transport_error(e))?)
            }
            CounterOp::CheckCooldown { .. } => {
                CounterReply::Cooldown(response.json().await.map_err(|e| self.transport_error(e))?)
            }
            CounterOp::Peek | CounterOp::IncrementFixedExpiry { .. } => {
                CounterReply::Snapshot(response.json().await.map_err(|e| self.transport_error(e))?)
            }
        };

        Ok(reply)
    }
}
