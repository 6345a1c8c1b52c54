use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ledger_relay::channel::build_channel;
use ledger_relay::config::AppConfig;
use ledger_relay::domain::{DeliveryStatus, LedgerEntry, Nature};
use ledger_relay::error::{RelayError, Result};
use ledger_relay::orchestrator::DeliveryOrchestrator;
use ledger_relay::retry::shutdown_channel;
use ledger_relay::scheduler::IntegrationScheduler;
use ledger_relay::store::postgres::PostgresStore;
use ledger_relay::store::{AuditSink, EntryStore};
use ledger_relay::{logging, ChannelKind};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ledger-relay")]
#[command(version)]
#[command(about = "Delivers queued accounting ledger entries to an external system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory (default.toml plus RELAY_ENV overrides)
    #[arg(short, long, default_value = "config")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler daemon until interrupted
    Run,
    /// Execute one integration pass and exit
    Once,
    /// Queue a new pending entry
    Add {
        /// Account code
        #[arg(long)]
        account: String,
        /// Entry description
        #[arg(long)]
        description: String,
        /// Amount at currency precision, e.g. 1500.00
        #[arg(long)]
        amount: Decimal,
        /// Entry date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// D (debit) or C (credit)
        #[arg(long)]
        nature: Nature,
    },
    /// Delete an entry from the queue
    Remove {
        /// Entry id
        id: i64,
    },
    /// List entries, optionally filtered by status
    List {
        /// PENDING | SENT | ERROR
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Queue an Error entry for redelivery
    Resend {
        /// Entry id
        id: i64,
    },
    /// Poll the provider-reported status of a sent batch (api channel only)
    BatchStatus {
        /// Provider batch identifier
        batch_id: String,
    },
    /// Show recent audit events
    Audit {
        /// Maximum events to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    logging::init(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Config: {}", e);
        }
        return Err(RelayError::Validation(format!(
            "{} configuration error(s)",
            errors.len()
        )));
    }

    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    );
    store.migrate().await?;

    let entry_store: Arc<dyn EntryStore> = store.clone();
    let audit_sink: Arc<dyn AuditSink> = store.clone();
    let channel = build_channel(&config)?;
    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        entry_store.clone(),
        audit_sink.clone(),
        channel.clone(),
        config.delivery.batch_size,
    ));

    match cli.command {
        Commands::Run => {
            let (shutdown_tx, shutdown_rx) = shutdown_channel();

            let scheduler = IntegrationScheduler::new(
                orchestrator,
                audit_sink,
                &config.scheduler.cron,
                config.scheduler.enabled,
                shutdown_rx,
            )?;
            let handle = scheduler.initialize();

            info!(
                "ledger-relay running; channel={}, schedule='{}'",
                config.integration.channel, config.scheduler.cron
            );

            signal::ctrl_c().await?;
            info!("Shutdown signal received");
            shutdown_tx.send(true).ok();
            handle.await.map_err(|e| {
                RelayError::Internal(format!("scheduler task join failed: {e}"))
            })?;
        }
        Commands::Once => {
            let report = orchestrator.run_integration().await?;
            if report.is_success() {
                info!(
                    "Integration complete: {} entries delivered in {} batches",
                    report.delivered, report.chunks
                );
            } else {
                warn!(
                    "Integration finished with errors: {}/{} entries failed",
                    report.failed, report.attempted
                );
            }
            println!("{}", report.legacy_count());
        }
        Commands::Add {
            account,
            description,
            amount,
            date,
            nature,
        } => {
            let entry = LedgerEntry::new(account, description, amount, date, nature);
            let id = entry_store.upsert(&entry).await?;
            println!("Entry {id} queued as PENDING");
        }
        Commands::Remove { id } => {
            entry_store
                .find_by_id(id)
                .await?
                .ok_or(RelayError::NotFound(id))?;
            entry_store.delete(id).await?;
            println!("Entry {id} deleted");
        }
        Commands::List { status } => {
            let entries = match status {
                Some(raw) => {
                    let status = DeliveryStatus::from_str(&raw)
                        .map_err(|e| RelayError::Validation(e.to_string()))?;
                    entry_store.find_by_status(status).await?
                }
                None => {
                    let mut all = Vec::new();
                    for status in [
                        DeliveryStatus::Pending,
                        DeliveryStatus::Sent,
                        DeliveryStatus::Error,
                    ] {
                        all.extend(entry_store.find_by_status(status).await?);
                    }
                    all
                }
            };

            for entry in entries {
                println!(
                    "{:>6}  {:<12}  {:>12}  {}  {}  {}",
                    entry.id.unwrap_or_default(),
                    entry.account,
                    entry.amount,
                    entry.entry_date,
                    entry.nature,
                    entry.status,
                );
            }
        }
        Commands::Resend { id } => {
            orchestrator.resend(id).await?;
            println!("Entry {id} queued for redelivery");
        }
        Commands::BatchStatus { batch_id } => {
            if config.integration.channel != ChannelKind::Api {
                warn!("Batch status polling is only meaningful for the api channel");
            }
            println!("{}", channel.batch_status(&batch_id).await);
        }
        Commands::Audit { limit } => {
            for event in audit_sink.list_recent(limit).await? {
                match &event.detail {
                    Some(detail) => println!("{event} ({detail})"),
                    None => println!("{event}"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn add_arguments_parse_into_typed_values() {
        let cli = Cli::try_parse_from([
            "ledger-relay",
            "add",
            "--account",
            "1.1.01",
            "--description",
            "Office rent",
            "--amount",
            "1500.00",
            "--date",
            "2024-03-15",
            "--nature",
            "D",
        ])
        .unwrap();

        match cli.command {
            Commands::Add {
                account,
                description,
                amount,
                date,
                nature,
            } => {
                assert_eq!(account, "1.1.01");
                assert_eq!(description, "Office rent");
                assert_eq!(amount, dec!(1500.00));
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
                assert_eq!(nature, Nature::Debit);
            }
            _ => panic!("expected the add subcommand"),
        }
    }

    #[test]
    fn bad_amount_or_nature_is_rejected_at_parse_time() {
        assert!(Cli::try_parse_from([
            "ledger-relay", "add", "--account", "1", "--description", "x", "--amount",
            "not-a-number", "--date", "2024-03-15", "--nature", "D",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "ledger-relay", "add", "--account", "1", "--description", "x", "--amount",
            "10.00", "--date", "2024-03-15", "--nature", "X",
        ])
        .is_err());
    }

    #[test]
    fn remove_takes_an_entry_id() {
        let cli = Cli::try_parse_from(["ledger-relay", "remove", "42"]).unwrap();
        assert!(matches!(cli.command, Commands::Remove { id: 42 }));
    }
}
