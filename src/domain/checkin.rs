//! Check-in records and derived admission statistics

use crate::domain::ticket::{new_uuid_v7, EventId, ScannerId, TicketId};
use serde::{Deserialize, Serialize};

/// Classified result of a validation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInOutcome {
    /// Ticket admitted; the one and only redemption
    Success,
    /// Valid ticket, already redeemed
    AlreadyUsed,
    /// Malformed payload or unknown ticket id
    Invalid,
    /// Valid ticket, revoked by the issuer
    Cancelled,
    /// Infrastructure fault (store unavailable/timeout); caller should retry
    Error,
}

impl CheckInOutcome {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInOutcome::Success => "success",
            CheckInOutcome::AlreadyUsed => "already_used",
            CheckInOutcome::Invalid => "invalid",
            CheckInOutcome::Cancelled => "cancelled",
            CheckInOutcome::Error => "error",
        }
    }

    /// Business outcomes are ledgered; infrastructure faults are not
    #[inline]
    pub fn is_business(&self) -> bool {
        !matches!(self, CheckInOutcome::Error)
    }
}

/// One immutable record per validation attempt, including failed ones
///
/// `ticket_id`/`event_id` are absent when the payload never decoded to a
/// ticket identity (malformed payloads carry no trustworthy id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    pub scanner_id: ScannerId,
    /// Server-observed epoch milliseconds
    pub timestamp: u64,
    pub outcome: CheckInOutcome,
    /// Human-readable reason surfaced to the scanner client
    pub reason: String,
}

impl CheckInRecord {
    pub fn new(
        ticket_id: Option<TicketId>,
        event_id: Option<EventId>,
        scanner_id: ScannerId,
        timestamp: u64,
        outcome: CheckInOutcome,
        reason: &str,
    ) -> Self {
        Self {
            id: new_uuid_v7(),
            ticket_id,
            event_id,
            scanner_id,
            timestamp,
            outcome,
            reason: reason.to_string(),
        }
    }
}

/// Read-only catalog entry for an event; populated by the catalog owner,
/// never mutated by this core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInfo {
    pub id: EventId,
    pub name: String,
    pub capacity: u32,
    /// Registered attendee count (tickets sold), from the catalog
    pub attendees: u32,
}

/// Live admission statistics, purely derived from store + catalog state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacitySnapshot {
    pub event_id: EventId,
    /// Count of tickets with status CheckedIn, read from the store
    pub checked_in: u32,
    /// attendees - checked_in (saturating)
    pub pending: u32,
    pub capacity: u32,
}
