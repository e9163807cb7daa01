//! JSON-over-HTTP with retry, shared by the embedding and LLM providers.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::debug;

/// A JSON POST endpoint with its retry budget.
pub(crate) struct JsonEndpoint {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
    max_retries: u32,
    /// Service name used in error messages (e.g. `"OpenAI"`).
    label: &'static str,
}

impl JsonEndpoint {
    pub(crate) fn new(
        url: String,
        bearer: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
        label: &'static str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url,
            bearer,
            max_retries,
            label,
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// POST `body` and return the parsed JSON response.
    pub(crate) async fn post(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(service = self.label, attempt, ?delay, "retrying request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(token) = &self.bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    // Rate limited or server error: retry
                    if is_retryable(status) {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "{} API error {}: {}",
                            self.label,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429): fail now
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("{} API error {}: {}", self.label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "{} connection error ({}): {}",
                        self.label,
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", self.label)))
    }
}

/// Delay before retry number `attempt` (1-based).
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
