//! Delivery channels
//!
//! A channel turns a batch of entries into a transmitted artifact and
//! reports the outcome as a [`BatchResult`]. Channels never touch the entry
//! store; translating outcomes into status writes is the orchestrator's job.

pub mod api;
pub mod file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::{BatchResult, LedgerEntry};
use crate::error::Result;

pub use api::ApiChannel;
pub use file::FileChannel;

/// Which delivery mechanism is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Api,
    File,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "file" => Ok(Self::File),
            _ => Err("invalid channel; expected api|file"),
        }
    }
}

/// One delivery mechanism (API call, or file generation + optional FTP)
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Channel name for logs and audit detail
    fn name(&self) -> &'static str;

    /// Transmit one batch. Infallible at the signature level: every failure
    /// mode is folded into the returned [`BatchResult`].
    async fn deliver(&self, batch: &[LedgerEntry]) -> BatchResult;

    /// Provider-reported status for a previously sent batch, or the sentinel
    /// `"ERROR"` when the query itself fails. Not retried.
    async fn batch_status(&self, batch_id: &str) -> String;
}

/// Build the configured channel
pub fn build_channel(config: &AppConfig) -> Result<Arc<dyn DeliveryChannel>> {
    match config.integration.channel {
        ChannelKind::Api => {
            let channel = ApiChannel::new(
                &config.api.url,
                &config.api.token,
                config.api.timeout_secs,
                config.delivery.retry_attempts,
            )?;
            Ok(Arc::new(channel))
        }
        ChannelKind::File => {
            let ftp = if config.ftp.enabled {
                Some(config.ftp.clone())
            } else {
                None
            };
            let channel = FileChannel::new(
                config.file.output_dir.clone(),
                config.file.format,
                ftp,
            );
            Ok(Arc::new(channel))
        }
    }
}

/// Shared failure-message shape so audit entries read the same across
/// channels
pub(crate) fn delivery_error(channel: &str, detail: impl std::fmt::Display) -> String {
    format!("{channel} delivery failed: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_kind_parses() {
        assert_eq!("api".parse::<ChannelKind>().unwrap(), ChannelKind::Api);
        assert_eq!(" FILE ".parse::<ChannelKind>().unwrap(), ChannelKind::File);
        assert!("smtp".parse::<ChannelKind>().is_err());
    }
}
