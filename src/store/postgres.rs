//! PostgreSQL implementation of the entry store and audit sink
//!
//! Column names follow the external accounting schema (conta, historico,
//! valor, data, natureza) because the tables are shared with the systems
//! that feed and inspect the queue.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::domain::{AuditEvent, DeliveryStatus, LedgerEntry, Nature, Severity};
use crate::error::{RelayError, Result};
use crate::store::{AuditSink, EntryStore};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and build a pool
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Reuse an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_entry(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry> {
        let nature: String = row.get("natureza");
        let status: String = row.get("status");

        Ok(LedgerEntry {
            id: Some(row.get::<i64, _>("id")),
            account: row.get("conta"),
            description: row.get("historico"),
            amount: row.get::<Decimal, _>("valor"),
            entry_date: row.get::<NaiveDate, _>("data"),
            nature: Nature::from_str(&nature)
                .map_err(|e| RelayError::Internal(format!("bad natureza column: {e}")))?,
            status: DeliveryStatus::from_str(&status)
                .map_err(|e| RelayError::Internal(format!("bad status column: {e}")))?,
            error_message: row.get("mensagem_erro"),
            sent_date: row.get::<Option<NaiveDate>, _>("data_envio"),
        })
    }
}

const ENTRY_COLUMNS: &str =
    "id, conta, historico, valor, data, natureza, status, mensagem_erro, data_envio";

#[async_trait]
impl EntryStore for PostgresStore {
    async fn find_by_status(&self, status: DeliveryStatus) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE status = $1 \
             ORDER BY data DESC, id DESC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_entry).collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_entry).transpose()
    }

    async fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE data BETWEEN $1 AND $2 \
             ORDER BY data DESC, id DESC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_entry).collect()
    }

    async fn upsert(&self, entry: &LedgerEntry) -> Result<i64> {
        let id = match entry.id {
            None => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO ledger_entries
                        (conta, historico, valor, data, natureza, status, mensagem_erro, data_envio)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING id
                    "#,
                )
                .bind(&entry.account)
                .bind(&entry.description)
                .bind(entry.amount)
                .bind(entry.entry_date)
                .bind(entry.nature.as_str())
                .bind(entry.status.as_str())
                .bind(&entry.error_message)
                .bind(entry.sent_date)
                .fetch_one(&self.pool)
                .await?;

                row.get::<i64, _>("id")
            }
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE ledger_entries SET
                        conta = $1, historico = $2, valor = $3, data = $4, natureza = $5,
                        status = $6, mensagem_erro = $7, data_envio = $8
                    WHERE id = $9
                    "#,
                )
                .bind(&entry.account)
                .bind(&entry.description)
                .bind(entry.amount)
                .bind(entry.entry_date)
                .bind(entry.nature.as_str())
                .bind(entry.status.as_str())
                .bind(&entry.error_message)
                .bind(entry.sent_date)
                .bind(id)
                .execute(&self.pool)
                .await?;

                id
            }
        };

        debug!("Upserted ledger entry {}", id);
        Ok(id)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM ledger_entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: i64,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        // Sent date accompanies the Sent status and only that status
        let sent_date = match status {
            DeliveryStatus::Sent => Some(Local::now().date_naive()),
            _ => None,
        };

        sqlx::query(
            "UPDATE ledger_entries SET status = $1, mensagem_erro = $2, data_envio = $3 \
             WHERE id = $4",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(sent_date)
        .bind(id)
        .execute(&self.pool)
        .await?;

        debug!("Entry {} -> {}", id, status);
        Ok(())
    }
}

#[async_trait]
impl AuditSink for PostgresStore {
    async fn append(&self, event: &AuditEvent) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO integration_logs (timestamp, tipo, mensagem, detalhes)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(event.timestamp)
        .bind(event.severity.as_str())
        .bind(&event.message)
        .bind(&event.detail)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("id"))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, tipo, mensagem, detalhes FROM integration_logs \
             ORDER BY timestamp DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let severity: String = row.get("tipo");
                Ok(AuditEvent {
                    id: Some(row.get::<i64, _>("id")),
                    timestamp: row.get::<DateTime<Utc>, _>("timestamp"),
                    severity: Severity::from_str(&severity)
                        .map_err(|e| RelayError::Internal(format!("bad tipo column: {e}")))?,
                    message: row.get("mensagem"),
                    detail: row.get("detalhes"),
                })
            })
            .collect()
    }
}
