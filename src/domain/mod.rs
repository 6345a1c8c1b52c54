pub mod audit;
pub mod batch;
pub mod entry;

pub use audit::{AuditEvent, Severity};
pub use batch::{chunk_entries, BatchResult};
pub use entry::{DeliveryStatus, LedgerEntry, Nature};
