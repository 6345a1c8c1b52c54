//! Persistence collaborators
//!
//! The entry store is the only shared mutable resource in the pipeline; the
//! audit sink is append-only. Both are trait seams so the orchestrator and
//! scheduler can be exercised against in-memory doubles.

pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{AuditEvent, DeliveryStatus, LedgerEntry};
use crate::error::Result;

/// Durable record of ledger entries and their delivery status
///
/// Single-row status updates are assumed atomic by the orchestrator.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn find_by_status(&self, status: DeliveryStatus) -> Result<Vec<LedgerEntry>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<LedgerEntry>>;

    async fn find_by_date_range(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<LedgerEntry>>;

    /// Insert or update; on insert the assigned id is returned and callers
    /// are expected to write it back to the entry
    async fn upsert(&self, entry: &LedgerEntry) -> Result<i64>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Update the delivery status of a single entry. Sets the sent date to
    /// today iff `status` is Sent, otherwise clears it.
    async fn update_status(
        &self,
        id: i64,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> Result<()>;
}

/// Append-only record of integration events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist the event; returns the assigned id
    async fn append(&self, event: &AuditEvent) -> Result<i64>;

    /// Most recent events, newest first
    async fn list_recent(&self, limit: i64) -> Result<Vec<AuditEvent>>;
}
