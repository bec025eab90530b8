//! Domain models - tickets, check-in records and event catalog entries
//!
//! This module contains the canonical data types used throughout the system:
//! - `Ticket` - the redeemable entry credential and its status machine
//! - `CheckInRecord` - one immutable record per validation attempt
//! - `CheckInOutcome` - classified result of a validation attempt
//! - `EventInfo` - read-only catalog entry (capacity, attendee count)

pub mod checkin;
pub mod ticket;

// Re-export commonly used types at module level
pub use checkin::{CapacitySnapshot, CheckInOutcome, CheckInRecord, EventInfo};
pub use ticket::{epoch_ms, new_uuid_v7, EventId, ScannerId, Ticket, TicketId, TicketStatus};
