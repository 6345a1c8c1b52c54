use super::LedgerEntry;

/// Outcome of sending one batch through a delivery channel
///
/// Transient value, never persisted. Channels report through this; the
/// orchestrator owns the translation into per-entry status writes.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub success: bool,
    /// Diagnostic on failure, informational on success
    pub message: Option<String>,
    /// Channel-specific payload reference: remote response body for the API
    /// channel, generated file path for the file channel
    pub reference: Option<String>,
}

impl BatchResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            reference: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Partition entries into contiguous chunks of at most `batch_size`,
/// preserving the original order. The last chunk may be smaller.
pub fn chunk_entries(entries: &[LedgerEntry], batch_size: usize) -> Vec<&[LedgerEntry]> {
    debug_assert!(batch_size > 0);
    entries.chunks(batch_size.max(1)).collect()
}
