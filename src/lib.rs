pub mod channel;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod logging;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;
pub mod store;

pub use channel::{build_channel, ApiChannel, ChannelKind, DeliveryChannel, FileChannel};
pub use config::AppConfig;
pub use domain::{AuditEvent, BatchResult, DeliveryStatus, LedgerEntry, Nature, Severity};
pub use error::{RelayError, Result};
pub use export::FileFormat;
pub use orchestrator::{DeliveryOrchestrator, DeliveryReport};
pub use retry::{shutdown_channel, RetryPolicy};
pub use scheduler::IntegrationScheduler;
pub use store::{postgres::PostgresStore, AuditSink, EntryStore};
