//! Services - business logic and state management
//!
//! This module contains the core check-in logic:
//! - `codec` - signed scan payload encoding and verification
//! - `store` - canonical ticket state with per-ticket CAS
//! - `engine` - validation orchestration (decode, CAS, ledger)
//! - `capacity` - derived admission statistics

pub mod capacity;
pub mod codec;
pub mod engine;
pub mod store;

// Re-export commonly used types
pub use capacity::CapacityTracker;
pub use codec::{CodecError, QrCodec};
pub use engine::{Validation, ValidationEngine};
pub use store::{
    restore_redemptions, CasOutcome, EventCatalog, MemoryTicketStore, StoreError, TicketStore,
};
