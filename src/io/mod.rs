//! IO modules - external system interfaces
//!
//! - `ledger` - append-only check-in record log (JSONL format)

pub mod ledger;

// Re-export commonly used types
pub use ledger::{CheckInLedger, LedgerError};
