//! Validation engine - decides whether a scanned payload admits an attendee
//!
//! Resolution order: decode -> lookup -> cancellation check -> CAS
//! Issued->CheckedIn -> ledger append. The CAS is the only point where
//! concurrent scanners racing on the same ticket are resolved; under N
//! simultaneous validations of one payload exactly one observes Success.
//! The winner's Success record is appended while the per-ticket
//! serialization is still held, so it is durable before any losing
//! scanner can observe CheckedIn and write its own record.
//!
//! Every store call is bounded by a timeout. Timeout or store
//! unavailability fails closed with outcome Error - never Success, and
//! never a ledger entry against the ticket (an infrastructure fault is not
//! a redemption attempt).

use crate::domain::checkin::{CheckInOutcome, CheckInRecord};
use crate::domain::ticket::{EventId, ScannerId, TicketId, TicketStatus};
use crate::infra::metrics::Metrics;
use crate::io::ledger::CheckInLedger;
use crate::services::codec::QrCodec;
use crate::services::store::{CasOutcome, StoreError, TicketStore};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Result of one validation attempt, surfaced to the scanner client
#[derive(Debug, Clone)]
pub struct Validation {
    pub outcome: CheckInOutcome,
    /// Human-readable reason for display at the entry point
    pub reason: String,
    /// Decoded ticket identity, when the payload decoded
    pub ticket_id: Option<TicketId>,
    /// Id of the appended ledger record, when one was written
    pub record_id: Option<String>,
}

pub struct ValidationEngine {
    codec: QrCodec,
    store: Arc<dyn TicketStore>,
    ledger: Arc<CheckInLedger>,
    metrics: Arc<Metrics>,
    store_timeout: Duration,
}

impl ValidationEngine {
    pub fn new(
        codec: QrCodec,
        store: Arc<dyn TicketStore>,
        ledger: Arc<CheckInLedger>,
        metrics: Arc<Metrics>,
        store_timeout: Duration,
    ) -> Self {
        Self { codec, store, ledger, metrics, store_timeout }
    }

    /// Validate a scanned or manually entered payload.
    ///
    /// Manual entry and camera scans share this single entry point; there
    /// is no privileged bypass path. `now_ms` is the server-observed
    /// timestamp recorded in the ledger.
    pub async fn validate(
        &self,
        payload: &str,
        scanner_id: &ScannerId,
        now_ms: u64,
    ) -> Validation {
        let started = Instant::now();
        let validation = self.validate_inner(payload, scanner_id, now_ms).await;
        let latency_us = started.elapsed().as_micros() as u64;

        self.metrics.record_validation(validation.outcome, latency_us);

        match validation.outcome {
            CheckInOutcome::Success => info!(
                scanner_id = %scanner_id,
                ticket_id = ?validation.ticket_id,
                latency_us = %latency_us,
                "checkin_admitted"
            ),
            CheckInOutcome::Error => error!(
                scanner_id = %scanner_id,
                ticket_id = ?validation.ticket_id,
                reason = %validation.reason,
                "checkin_store_error"
            ),
            _ => warn!(
                scanner_id = %scanner_id,
                ticket_id = ?validation.ticket_id,
                outcome = %validation.outcome.as_str(),
                reason = %validation.reason,
                "checkin_rejected"
            ),
        }

        validation
    }

    async fn validate_inner(
        &self,
        payload: &str,
        scanner_id: &ScannerId,
        now_ms: u64,
    ) -> Validation {
        // 1. Decode and verify the payload before touching the store
        let (ticket_id, event_id) = match self.codec.decode(payload) {
            Ok(identity) => identity,
            Err(_) => {
                return self.record(
                    None,
                    None,
                    scanner_id,
                    now_ms,
                    CheckInOutcome::Invalid,
                    "malformed payload",
                );
            }
        };

        // 2. Look up the ticket
        let ticket = match self.store_call(self.store.get(&ticket_id)).await {
            Ok(ticket) => ticket,
            Err(StoreError::NotFound) => {
                return self.record(
                    Some(ticket_id),
                    Some(event_id),
                    scanner_id,
                    now_ms,
                    CheckInOutcome::Invalid,
                    "ticket not found",
                );
            }
            Err(_) => {
                return self.record(
                    Some(ticket_id),
                    Some(event_id),
                    scanner_id,
                    now_ms,
                    CheckInOutcome::Error,
                    "store unavailable, retry",
                );
            }
        };

        // 3. Revoked tickets are terminal regardless of prior attempts
        if ticket.status == TicketStatus::Cancelled {
            return self.record(
                Some(ticket_id),
                Some(event_id),
                scanner_id,
                now_ms,
                CheckInOutcome::Cancelled,
                "ticket cancelled",
            );
        }

        // 4. Attempt the atomic admission. The Success record is appended
        // by the store's on_swap callback, inside the per-ticket
        // serialization, so it lands in the ledger before any racing
        // scanner can observe CheckedIn and append its own record.
        let success_record = Mutex::new(Some(CheckInRecord::new(
            Some(ticket_id.clone()),
            Some(event_id.clone()),
            scanner_id.clone(),
            now_ms,
            CheckInOutcome::Success,
            "checked in",
        )));
        let success_record_id = Mutex::new(None);

        let cas = self
            .store_call(self.store.compare_and_swap_status_with(
                &ticket_id,
                TicketStatus::Issued,
                TicketStatus::CheckedIn,
                &|| {
                    if let Some(record) = success_record.lock().take() {
                        *success_record_id.lock() = self.append(record);
                    }
                },
            ))
            .await;

        match cas {
            Ok(CasOutcome::Swapped) => Validation {
                outcome: CheckInOutcome::Success,
                reason: "checked in".to_string(),
                ticket_id: Some(ticket_id),
                record_id: success_record_id.lock().take(),
            },
            Ok(CasOutcome::Conflict(TicketStatus::Cancelled)) => {
                // Lost the race to a cancellation
                self.record(
                    Some(ticket_id),
                    Some(event_id),
                    scanner_id,
                    now_ms,
                    CheckInOutcome::Cancelled,
                    "ticket cancelled",
                )
            }
            Ok(CasOutcome::Conflict(_)) => self.record(
                Some(ticket_id),
                Some(event_id),
                scanner_id,
                now_ms,
                CheckInOutcome::AlreadyUsed,
                "ticket already used",
            ),
            Err(_) => self.record(
                Some(ticket_id),
                Some(event_id),
                scanner_id,
                now_ms,
                CheckInOutcome::Error,
                "store unavailable, retry",
            ),
        }
    }

    /// Bound a store call with the configured timeout; both an elapsed
    /// timeout and an explicit Unavailable collapse to Unavailable.
    async fn store_call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable),
        }
    }

    /// Ledger a business outcome and build the response. Infrastructure
    /// faults fail closed: they are returned to the caller but never
    /// appended, so an outage is not recorded as a redemption attempt.
    fn record(
        &self,
        ticket_id: Option<TicketId>,
        event_id: Option<EventId>,
        scanner_id: &ScannerId,
        now_ms: u64,
        outcome: CheckInOutcome,
        reason: &str,
    ) -> Validation {
        let record_id = if outcome.is_business() {
            self.append(CheckInRecord::new(
                ticket_id.clone(),
                event_id,
                scanner_id.clone(),
                now_ms,
                outcome,
                reason,
            ))
        } else {
            None
        };

        Validation { outcome, reason: reason.to_string(), ticket_id, record_id }
    }

    /// Append one record. A write failure after a won CAS does not retract
    /// the admission; it is logged and the response carries no record id.
    fn append(&self, record: CheckInRecord) -> Option<String> {
        let record_id = record.id.clone();
        match self.ledger.append(record) {
            Ok(()) => Some(record_id),
            Err(e) => {
                error!(record_id = %record_id, error = %e, "ledger_append_failed");
                None
            }
        }
    }
}
