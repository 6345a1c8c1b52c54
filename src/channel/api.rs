//! HTTP API delivery channel
//!
//! Serializes a batch to the accounting system's JSON payload and POSTs it
//! with a bearer token, wrapped by the retry policy. The status-poll
//! operation is a secondary capability and is deliberately not retried.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::channel::{delivery_error, DeliveryChannel};
use crate::domain::{BatchResult, LedgerEntry};
use crate::error::{RelayError, Result};
use crate::export::to_records;
use crate::retry::{shutdown_channel, RetryPolicy};

/// Status string returned when the poll itself fails
pub const STATUS_QUERY_FAILED: &str = "ERROR";

pub struct ApiChannel {
    http: Client,
    url: String,
    token: String,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl ApiChannel {
    pub fn new(url: &str, token: &str, timeout_secs: u64, retry_attempts: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        // Default channel never fires; a real one is attached by the daemon
        let (_, shutdown) = shutdown_channel();

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryPolicy::new(retry_attempts),
            shutdown,
        })
    }

    /// Attach the process shutdown signal so backoff waits abort promptly
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Single POST attempt; any non-2xx status is an error so the retry
    /// policy treats it as transient
    async fn post_once(&self, batch: &[LedgerEntry]) -> Result<String> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&to_records(batch))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            Ok(body)
        } else {
            Err(RelayError::ApiStatus {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl DeliveryChannel for ApiChannel {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn deliver(&self, batch: &[LedgerEntry]) -> BatchResult {
        let mut shutdown = self.shutdown.clone();
        let outcome = self
            .retry
            .run(|| self.post_once(batch), &mut shutdown)
            .await;

        match outcome {
            Ok(body) => {
                info!("Batch of {} entries accepted by API", batch.len());
                BatchResult::ok().with_reference(body)
            }
            Err(e) => {
                warn!("Batch of {} entries rejected: {}", batch.len(), e);
                BatchResult::failed(delivery_error(self.name(), e))
            }
        }
    }

    async fn batch_status(&self, batch_id: &str) -> String {
        let url = format!("{}/status/{}", self.url, batch_id);

        let response = match self.http.get(&url).bearer_auth(&self.token).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Batch status query failed: {}", e);
                return STATUS_QUERY_FAILED.to_string();
            }
        };

        if response.status().is_success() {
            response.text().await.unwrap_or_default()
        } else {
            warn!("Batch status query returned {}", response.status());
            STATUS_QUERY_FAILED.to_string()
        }
    }
}
