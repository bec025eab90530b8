//! Gatekeeper - ticket check-in and validation engine
//!
//! Decides, for a scanned or manually entered ticket payload, whether an
//! attendee may be admitted, and guarantees each issued ticket is redeemed
//! at most once even under concurrent scanning at multiple entry points.
//!
//! Module structure:
//! - `domain/` - Core business types (Ticket, CheckInRecord, EventInfo)
//! - `io/` - External interfaces (check-in ledger, JSONL)
//! - `services/` - Business logic (QrCodec, TicketStore, ValidationEngine)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use gatekeeper::domain::{epoch_ms, EventId, ScannerId, Ticket, TicketId};
use gatekeeper::infra::{Config, Metrics};
use gatekeeper::io::CheckInLedger;
use gatekeeper::services::{
    restore_redemptions, CapacityTracker, EventCatalog, MemoryTicketStore, QrCodec, TicketStore,
    ValidationEngine,
};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Gatekeeper - ticket check-in and validation engine
#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a ticket identity into a signed scan payload
    Encode {
        ticket_id: String,
        event_id: String,
    },
    /// Validate a payload and record the attempt in the ledger
    Validate {
        payload: String,
        /// Scanner client identifier recorded with the attempt
        #[arg(short, long, default_value = "manual")]
        scanner: String,
    },
    /// Show live admission statistics for an event
    Stats { event_id: String },
    /// Show recent check-in records
    Ledger {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        ledger_file = %config.ledger_file(),
        tickets_file = %config.tickets_file(),
        store_timeout_ms = %config.store_timeout_ms(),
        git_hash = %env!("GIT_HASH"),
        "config_loaded"
    );

    let codec = QrCodec::new(config.secret()).context("invalid signing secret")?;

    // Encode needs no state; everything else works over the seeded store
    if let Command::Encode { ticket_id, event_id } = &args.command {
        let payload = codec.encode(&TicketId(ticket_id.clone()), &EventId(event_id.clone()));
        println!("{payload}");
        return Ok(());
    }

    let store: Arc<MemoryTicketStore> = Arc::new(MemoryTicketStore::new());
    let catalog = Arc::new(EventCatalog::from_events(config.events().iter().cloned()));
    let ledger = Arc::new(
        CheckInLedger::open(config.ledger_file()).context("failed to open ledger")?,
    );

    seed_tickets(&*store, config.tickets_file()).await?;
    restore_redemptions(&*store, &ledger).await;

    let metrics = Arc::new(Metrics::new());
    let store_dyn: Arc<dyn TicketStore> = store.clone();

    match args.command {
        Command::Encode { .. } => unreachable!("handled above"),
        Command::Validate { payload, scanner } => {
            let engine = ValidationEngine::new(
                codec,
                store_dyn,
                ledger,
                metrics,
                Duration::from_millis(config.store_timeout_ms()),
            );

            let validation =
                engine.validate(&payload, &ScannerId(scanner), epoch_ms()).await;
            println!("{}: {}", validation.outcome.as_str(), validation.reason);
            if let Some(ticket_id) = &validation.ticket_id {
                println!("ticket: {ticket_id}");
            }
        }
        Command::Stats { event_id } => {
            let tracker = CapacityTracker::new(store_dyn, catalog);
            let snapshot = tracker
                .recompute(&EventId(event_id))
                .await
                .context("failed to compute stats")?;
            println!("event:      {}", snapshot.event_id);
            println!("checked in: {}", snapshot.checked_in);
            println!("pending:    {}", snapshot.pending);
            println!("capacity:   {}", snapshot.capacity);
        }
        Command::Ledger { limit } => {
            for record in ledger.recent(limit) {
                let when = DateTime::from_timestamp_millis(record.timestamp as i64)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| record.timestamp.to_string());
                let ticket = record
                    .ticket_id
                    .map(|t| t.0)
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{when}  {:<12} {:<16} {} ({})",
                    record.outcome.as_str(),
                    ticket,
                    record.scanner_id,
                    record.reason
                );
            }
        }
    }

    Ok(())
}

/// Load issued tickets from the JSONL issuance feed into the store.
/// A missing file is not fatal; the store just starts empty.
async fn seed_tickets(store: &MemoryTicketStore, path: &str) -> anyhow::Result<()> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(_) => {
            warn!(tickets_file = %path, "tickets_file_missing");
            return Ok(());
        }
    };

    let mut loaded = 0usize;
    for (lineno, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed reading {path}"))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Ticket>(&line) {
            Ok(ticket) => {
                if store.create(ticket).await.is_ok() {
                    loaded += 1;
                }
            }
            Err(e) => {
                warn!(tickets_file = %path, line = %(lineno + 1), error = %e, "ticket_seed_skipped_line");
            }
        }
    }

    info!(tickets_file = %path, loaded = %loaded, "tickets_seeded");
    Ok(())
}
