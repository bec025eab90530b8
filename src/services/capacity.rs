//! Derived admission statistics
//!
//! Checked-in counts are read from ticket status in the store on every
//! recompute rather than kept as a shadow counter, so the numbers can
//! never drift from the source of truth.

use crate::domain::checkin::CapacitySnapshot;
use crate::domain::ticket::EventId;
use crate::services::store::{EventCatalog, StoreError, TicketStore};
use std::sync::Arc;

pub struct CapacityTracker {
    store: Arc<dyn TicketStore>,
    catalog: Arc<EventCatalog>,
}

impl CapacityTracker {
    pub fn new(store: Arc<dyn TicketStore>, catalog: Arc<EventCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Recompute live admission statistics for one event
    pub async fn recompute(&self, event_id: &EventId) -> Result<CapacitySnapshot, StoreError> {
        let info = self.catalog.get(event_id).ok_or(StoreError::NotFound)?;
        let checked_in = self.store.checked_in_count(event_id).await?;

        Ok(CapacitySnapshot {
            event_id: event_id.clone(),
            checked_in,
            pending: info.attendees.saturating_sub(checked_in),
            capacity: info.capacity,
        })
    }
}
