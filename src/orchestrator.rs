//! Delivery orchestration
//!
//! Splits the working set into batches, dispatches each through the
//! configured channel, translates batch outcomes into per-entry status
//! writes, and emits audit events at each milestone. The orchestrator is the
//! only component allowed to transition entry statuses.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::channel::DeliveryChannel;
use crate::domain::{chunk_entries, AuditEvent, DeliveryStatus, LedgerEntry};
use crate::error::Result;
use crate::store::{AuditSink, EntryStore};

/// Outcome of one integration run or one `send_batches` call
///
/// Carries explicit partial progress instead of a single all-or-nothing
/// flag; the original all-or-nothing contract survives as
/// [`DeliveryReport::legacy_count`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Entries handed to the channel across all chunks
    pub attempted: usize,
    /// Entries in chunks that succeeded
    pub delivered: usize,
    /// Entries in chunks that failed
    pub failed: usize,
    /// Chunks dispatched
    pub chunks: usize,
    /// Chunks that failed
    pub failed_chunks: usize,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.failed_chunks == 0
    }

    /// The attempted count when every chunk succeeded, otherwise 0: the
    /// historical all-or-nothing signal, kept for callers that still want it
    pub fn legacy_count(&self) -> usize {
        if self.is_success() {
            self.attempted
        } else {
            0
        }
    }
}

pub struct DeliveryOrchestrator {
    store: Arc<dyn EntryStore>,
    audit: Arc<dyn AuditSink>,
    channel: Arc<dyn DeliveryChannel>,
    batch_size: usize,
    // Overlapping runs on the same pending set would double-send; serialize
    // them within the process
    run_lock: Mutex<()>,
}

impl DeliveryOrchestrator {
    pub fn new(
        store: Arc<dyn EntryStore>,
        audit: Arc<dyn AuditSink>,
        channel: Arc<dyn DeliveryChannel>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            audit,
            channel,
            batch_size: batch_size.max(1),
            run_lock: Mutex::new(()),
        }
    }

    /// Deliver the given entries in chunks of at most `batch_size`.
    ///
    /// Every chunk is attempted even after an earlier chunk fails; each chunk
    /// outcome is persisted per entry and audited before the next chunk
    /// starts.
    pub async fn send_batches(&self, entries: &[LedgerEntry]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for chunk in chunk_entries(entries, self.batch_size) {
            let batch_ref = Uuid::new_v4();
            report.chunks += 1;
            report.attempted += chunk.len();

            info!(
                "Dispatching batch {} ({} entries) via {} channel",
                batch_ref,
                chunk.len(),
                self.channel.name()
            );

            let outcome = self.channel.deliver(chunk).await;

            if outcome.success {
                report.delivered += chunk.len();
                self.persist_chunk_status(chunk, DeliveryStatus::Sent, None).await;
                self.audit(
                    AuditEvent::info(format!("Batch {batch_ref} delivered"))
                        .with_detail(chunk_detail(chunk.len(), &outcome.reference)),
                )
                .await;
            } else {
                report.failed += chunk.len();
                report.failed_chunks += 1;

                let diagnostic = outcome
                    .message
                    .as_deref()
                    .unwrap_or("delivery failed without diagnostic");
                warn!("Batch {} failed: {}", batch_ref, diagnostic);

                self.persist_chunk_status(chunk, DeliveryStatus::Error, Some(diagnostic))
                    .await;
                self.audit(
                    AuditEvent::warning(format!("Batch {batch_ref} failed"))
                        .with_detail(diagnostic.to_string()),
                )
                .await;
            }
        }

        report
    }

    /// Fetch all pending entries and deliver them.
    ///
    /// No-op on an empty pending set. Serialized against concurrent
    /// invocations so two schedulers firing together cannot resend the same
    /// entries.
    pub async fn run_integration(&self) -> Result<DeliveryReport> {
        let _guard = self.run_lock.lock().await;

        let pending = self.store.find_by_status(DeliveryStatus::Pending).await?;

        if pending.is_empty() {
            info!("No pending entries to integrate");
            return Ok(DeliveryReport::default());
        }

        info!("Starting integration of {} pending entries", pending.len());
        self.audit(
            AuditEvent::info("Integration run started")
                .with_detail(format!("{} pending entries", pending.len())),
        )
        .await;

        let report = self.send_batches(&pending).await;

        if report.is_success() {
            info!("Integration finished: {} entries delivered", report.delivered);
            self.audit(
                AuditEvent::info("Integration run finished").with_detail(format!(
                    "{} delivered in {} batches",
                    report.delivered, report.chunks
                )),
            )
            .await;
        } else {
            warn!(
                "Integration finished with errors: {}/{} entries failed",
                report.failed, report.attempted
            );
            self.audit(
                AuditEvent::warning("Integration run finished with errors").with_detail(format!(
                    "{} of {} batches failed ({} entries)",
                    report.failed_chunks, report.chunks, report.failed
                )),
            )
            .await;
        }

        Ok(report)
    }

    /// Transition an Error entry back to Pending so the next run picks it up
    pub async fn resend(&self, id: i64) -> Result<()> {
        let entry = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(crate::error::RelayError::NotFound(id))?;

        if !entry.status.can_transition_to(DeliveryStatus::Pending) {
            return Err(crate::error::RelayError::InvalidTransition {
                from: entry.status.to_string(),
                to: DeliveryStatus::Pending.to_string(),
            });
        }

        self.store
            .update_status(id, DeliveryStatus::Pending, None)
            .await?;
        self.audit(AuditEvent::info(format!("Entry {id} queued for resend")))
            .await;
        Ok(())
    }

    /// Write one chunk's outcome to the store, entry by entry. Store write
    /// failures are logged and skipped; the next read reconciles.
    async fn persist_chunk_status(
        &self,
        chunk: &[LedgerEntry],
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) {
        for entry in chunk {
            let Some(id) = entry.id else {
                error!("Entry without id in dispatched chunk; skipping status write");
                continue;
            };

            if let Err(e) = self.store.update_status(id, status, error_message).await {
                error!("Failed to persist status {} for entry {}: {}", status, id, e);
            }
        }
    }

    async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.append(&event).await {
            error!("Failed to append audit event '{}': {}", event.message, e);
        }
    }
}

fn chunk_detail(len: usize, reference: &Option<String>) -> String {
    match reference {
        Some(reference) if !reference.is_empty() => {
            format!("{len} entries; reference: {reference}")
        }
        _ => format!("{len} entries"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_count_is_all_or_nothing() {
        let full = DeliveryReport {
            attempted: 250,
            delivered: 250,
            failed: 0,
            chunks: 3,
            failed_chunks: 0,
        };
        assert_eq!(full.legacy_count(), 250);

        let partial = DeliveryReport {
            attempted: 250,
            delivered: 150,
            failed: 100,
            chunks: 3,
            failed_chunks: 1,
        };
        assert!(!partial.is_success());
        assert_eq!(partial.legacy_count(), 0);
    }
}
