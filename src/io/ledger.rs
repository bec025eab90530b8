//! Append-only check-in ledger
//!
//! Records are written in JSONL format (one JSON object per line) to the
//! file specified in config, and mirrored in an in-memory index ordered by
//! append time. Records are never mutated or deleted; the file is opened in
//! append mode and replayed at startup so duplicate-redemption history
//! survives restarts.

use crate::domain::checkin::{CheckInOutcome, CheckInRecord};
use crate::domain::ticket::{EventId, TicketId};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only record log with a JSONL file behind it
pub struct CheckInLedger {
    file_path: Option<PathBuf>,
    records: Mutex<Vec<CheckInRecord>>,
}

impl CheckInLedger {
    /// Memory-only ledger (tests, dry runs)
    pub fn in_memory() -> Self {
        Self { file_path: None, records: Mutex::new(Vec::new()) }
    }

    /// Open a file-backed ledger, replaying any existing records.
    ///
    /// Lines that fail to parse are skipped with a warning rather than
    /// aborting startup; the file itself is never rewritten.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let mut records = Vec::new();

        if path.exists() {
            let file = std::fs::File::open(&path)?;
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<CheckInRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(
                            file = %path.display(),
                            line = %(lineno + 1),
                            error = %e,
                            "ledger_replay_skipped_line"
                        );
                    }
                }
            }
        }

        info!(
            file = %path.display(),
            replayed = %records.len(),
            "ledger_opened"
        );

        Ok(Self { file_path: Some(path), records: Mutex::new(records) })
    }

    /// Append an immutable record.
    ///
    /// The file write happens under the index lock so file order and index
    /// order stay aligned, and the record is durable before it becomes
    /// visible to readers.
    pub fn append(&self, record: CheckInRecord) -> Result<(), LedgerError> {
        let line = serde_json::to_string(&record)?;

        let mut records = self.records.lock();
        if let Some(path) = &self.file_path {
            Self::append_line(path, &line)?;
        }

        info!(
            record_id = %record.id,
            ticket_id = ?record.ticket_id,
            scanner_id = %record.scanner_id,
            outcome = %record.outcome.as_str(),
            "checkin_recorded"
        );

        records.push(record);
        Ok(())
    }

    fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %path.display(), bytes = %line.len(), "ledger_written");
        Ok(())
    }

    /// Records for an event inside `[from_ms, to_ms]`, ordered by append
    /// time. Returns an owned, finite sequence; calling again restarts from
    /// the beginning. Records without a decoded event identity (malformed
    /// payloads) are not attributable to any event and are excluded.
    pub fn query(
        &self,
        event_id: &EventId,
        from_ms: u64,
        to_ms: u64,
    ) -> impl Iterator<Item = CheckInRecord> {
        let records = self.records.lock();
        records
            .iter()
            .filter(|r| {
                r.event_id.as_ref() == Some(event_id)
                    && r.timestamp >= from_ms
                    && r.timestamp <= to_ms
            })
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Newest records first, at most `limit`
    pub fn recent(&self, limit: usize) -> Vec<CheckInRecord> {
        let records = self.records.lock();
        records.iter().rev().take(limit).cloned().collect()
    }

    /// Ticket ids with at least one Success record (used to restore
    /// redemption state into the store after a restart)
    pub fn redeemed_ticket_ids(&self) -> Vec<TicketId> {
        let records = self.records.lock();
        records
            .iter()
            .filter(|r| r.outcome == CheckInOutcome::Success)
            .filter_map(|r| r.ticket_id.clone())
            .collect()
    }

    /// Number of Success records for one ticket (audit invariant: <= 1)
    pub fn success_count(&self, ticket_id: &TicketId) -> usize {
        let records = self.records.lock();
        records
            .iter()
            .filter(|r| {
                r.outcome == CheckInOutcome::Success && r.ticket_id.as_ref() == Some(ticket_id)
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
