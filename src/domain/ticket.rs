//! Ticket identity and lifecycle types

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable), used for check-in record ids
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for ticket identifiers to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub String);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TicketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Newtype wrapper for event identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Newtype wrapper for scanner client identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScannerId(pub String);

impl std::fmt::Display for ScannerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScannerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ticket lifecycle status
///
/// Legal transitions: Issued -> CheckedIn, Issued -> Cancelled.
/// CheckedIn and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Issued,
    CheckedIn,
    Cancelled,
}

impl TicketStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Issued => "issued",
            TicketStatus::CheckedIn => "checked_in",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states admit no further transitions
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::CheckedIn | TicketStatus::Cancelled)
    }

    /// Whether a transition from `self` to `next` is legal
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Issued, TicketStatus::CheckedIn)
                | (TicketStatus::Issued, TicketStatus::Cancelled)
        )
    }
}

/// A redeemable entry credential bound to one event and one holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub event_id: EventId,
    pub holder_name: String,
    pub email: String,
    pub ticket_type: String,
    /// Epoch milliseconds at issuance
    pub issued_at: u64,
    pub status: TicketStatus,
}

impl Ticket {
    /// Create a freshly issued ticket (issuance boundary)
    pub fn issued(
        id: TicketId,
        event_id: EventId,
        holder_name: &str,
        email: &str,
        ticket_type: &str,
    ) -> Self {
        Self {
            id,
            event_id,
            holder_name: holder_name.to_string(),
            email: email.to_string(),
            ticket_type: ticket_type.to_string(),
            issued_at: epoch_ms(),
            status: TicketStatus::Issued,
        }
    }
}
