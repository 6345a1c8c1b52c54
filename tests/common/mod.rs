//! Shared in-memory doubles for the persistence collaborators and a
//! scripted delivery channel.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ledger_relay::domain::{AuditEvent, BatchResult, DeliveryStatus, LedgerEntry, Nature};
use ledger_relay::error::Result;
use ledger_relay::store::{AuditSink, EntryStore};
use ledger_relay::DeliveryChannel;

/// Entry store + audit sink backed by a Vec, mirroring the store contract:
/// `update_status` sets the sent date iff the new status is Sent.
#[derive(Default)]
pub struct InMemoryStore {
    pub entries: Mutex<Vec<LedgerEntry>>,
    pub events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryStore {
    pub fn with_pending(count: usize) -> Self {
        let store = Self::default();
        {
            let mut entries = store.entries.lock().unwrap();
            for i in 0..count {
                let mut entry = make_entry(i);
                entry.id = Some(i as i64 + 1);
                entries.push(entry);
            }
        }
        store
    }

    pub fn statuses(&self) -> Vec<DeliveryStatus> {
        self.entries.lock().unwrap().iter().map(|e| e.status).collect()
    }

    pub fn event_messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }
}

pub fn make_entry(i: usize) -> LedgerEntry {
    LedgerEntry::new(
        format!("1.1.{i:03}"),
        format!("entry {i}"),
        dec!(10.00),
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        if i % 2 == 0 { Nature::Debit } else { Nature::Credit },
    )
}

#[async_trait]
impl EntryStore for InMemoryStore {
    async fn find_by_status(&self, status: DeliveryStatus) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.status == status)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<LedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == Some(id))
            .cloned())
    }

    async fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.entry_date >= start && e.entry_date <= end)
            .cloned()
            .collect())
    }

    async fn upsert(&self, entry: &LedgerEntry) -> Result<i64> {
        let mut entries = self.entries.lock().unwrap();
        match entry.id {
            Some(id) => {
                if let Some(existing) = entries.iter_mut().find(|e| e.id == Some(id)) {
                    *existing = entry.clone();
                }
                Ok(id)
            }
            None => {
                let id = entries.len() as i64 + 1;
                let mut inserted = entry.clone();
                inserted.id = Some(id);
                entries.push(inserted);
                Ok(id)
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.entries.lock().unwrap().retain(|e| e.id != Some(id));
        Ok(())
    }

    async fn update_status(
        &self,
        id: i64,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == Some(id)) {
            entry.status = status;
            entry.error_message = error_message.map(str::to_string);
            entry.sent_date = match status {
                DeliveryStatus::Sent => Some(Local::now().date_naive()),
                _ => None,
            };
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn append(&self, event: &AuditEvent) -> Result<i64> {
        let mut events = self.events.lock().unwrap();
        let id = events.len() as i64 + 1;
        let mut stored = event.clone();
        stored.id = Some(id);
        events.push(stored);
        Ok(id)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<AuditEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events.iter().rev().take(limit as usize).cloned().collect())
    }
}

/// Channel that fails the batches whose (zero-based) dispatch index appears
/// in `failing_batches`, with a fixed diagnostic.
pub struct ScriptedChannel {
    pub failing_batches: Vec<usize>,
    pub failure_message: String,
    pub calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

impl ScriptedChannel {
    pub fn all_success() -> Self {
        Self::failing(Vec::new(), "")
    }

    pub fn failing(failing_batches: Vec<usize>, failure_message: &str) -> Self {
        Self {
            failing_batches,
            failure_message: failure_message.to_string(),
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DeliveryChannel for ScriptedChannel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn deliver(&self, batch: &[LedgerEntry]) -> BatchResult {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(batch.len());

        if self.failing_batches.contains(&index) {
            BatchResult::failed(self.failure_message.clone())
        } else {
            BatchResult::ok().with_reference(format!("ack-{index}"))
        }
    }

    async fn batch_status(&self, _batch_id: &str) -> String {
        "PROCESSED".to_string()
    }
}
