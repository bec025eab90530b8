//! Canonical ticket state and the per-ticket CAS primitive
//!
//! `TicketStore` is the single source of truth for redemption state. The
//! only mutation primitive is `compare_and_swap_status`, serialized per
//! ticket id (one mutex per entry, never a store-wide lock), so concurrent
//! scanners racing on the same ticket resolve deterministically while
//! unrelated tickets stay uncontended.

use crate::domain::checkin::EventInfo;
use crate::domain::ticket::{EventId, Ticket, TicketId, TicketStatus};
use crate::io::ledger::CheckInLedger;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("ticket not found")]
    NotFound,
    #[error("ticket already exists")]
    Duplicate,
    #[error("illegal status transition")]
    InvalidTransition,
    /// Transient infrastructure fault; callers must fail closed and retry
    #[error("store unavailable")]
    Unavailable,
}

/// Result of a compare-and-swap attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Status was `expected` and is now `next`
    Swapped,
    /// Status differed; carries the status actually observed under the
    /// per-ticket lock, so callers can classify the loss without a second
    /// racy read
    Conflict(TicketStatus),
}

/// Canonical status store for issued tickets
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Issuance boundary: insert a new ticket. Rejects duplicate ids.
    async fn create(&self, ticket: Ticket) -> Result<(), StoreError>;

    /// Fetch a point-in-time copy of a ticket
    async fn get(&self, id: &TicketId) -> Result<Ticket, StoreError>;

    /// Atomically transition status iff the current status equals
    /// `expected`. Only the transitions of the ticket state machine are
    /// accepted; anything else is `InvalidTransition` regardless of the
    /// current status.
    async fn compare_and_swap_status(
        &self,
        id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> Result<CasOutcome, StoreError> {
        self.compare_and_swap_status_with(id, expected, next, &|| {}).await
    }

    /// CAS that runs `on_swap` while the per-ticket serialization is still
    /// held after a winning swap. The side effect completes before the new
    /// status can be observed by any other caller, so e.g. a ledger append
    /// for the winner lands ahead of every record a racing loser writes.
    async fn compare_and_swap_status_with(
        &self,
        id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
        on_swap: &(dyn Fn() + Send + Sync),
    ) -> Result<CasOutcome, StoreError>;

    /// Count of tickets for `event_id` with status CheckedIn, derived from
    /// ticket state (not a separately maintained counter)
    async fn checked_in_count(&self, event_id: &EventId) -> Result<u32, StoreError>;
}

/// In-memory `TicketStore` with per-entry locking
pub struct MemoryTicketStore {
    /// Outer lock guards the index only; each ticket has its own mutex so
    /// CAS on one ticket never blocks another
    tickets: RwLock<FxHashMap<TicketId, Arc<Mutex<Ticket>>>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self { tickets: RwLock::new(FxHashMap::default()) }
    }

    fn entry(&self, id: &TicketId) -> Result<Arc<Mutex<Ticket>>, StoreError> {
        self.tickets.read().get(id).cloned().ok_or(StoreError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.tickets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.read().is_empty()
    }
}

impl Default for MemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create(&self, ticket: Ticket) -> Result<(), StoreError> {
        let mut tickets = self.tickets.write();
        if tickets.contains_key(&ticket.id) {
            return Err(StoreError::Duplicate);
        }
        tickets.insert(ticket.id.clone(), Arc::new(Mutex::new(ticket)));
        Ok(())
    }

    async fn get(&self, id: &TicketId) -> Result<Ticket, StoreError> {
        let entry = self.entry(id)?;
        let ticket = entry.lock();
        Ok(ticket.clone())
    }

    async fn compare_and_swap_status_with(
        &self,
        id: &TicketId,
        expected: TicketStatus,
        next: TicketStatus,
        on_swap: &(dyn Fn() + Send + Sync),
    ) -> Result<CasOutcome, StoreError> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::InvalidTransition);
        }

        let entry = self.entry(id)?;
        let mut ticket = entry.lock();
        if ticket.status == expected {
            ticket.status = next;
            // Still under the entry lock: no other caller can observe the
            // new status until this returns
            on_swap();
            Ok(CasOutcome::Swapped)
        } else {
            Ok(CasOutcome::Conflict(ticket.status))
        }
    }

    async fn checked_in_count(&self, event_id: &EventId) -> Result<u32, StoreError> {
        let tickets = self.tickets.read();
        let count = tickets
            .values()
            .filter(|entry| {
                let ticket = entry.lock();
                ticket.event_id == *event_id && ticket.status == TicketStatus::CheckedIn
            })
            .count();
        Ok(count as u32)
    }
}

/// Read-only event catalog, populated at startup by the catalog owner
pub struct EventCatalog {
    events: RwLock<FxHashMap<EventId, EventInfo>>,
}

impl EventCatalog {
    pub fn new() -> Self {
        Self { events: RwLock::new(FxHashMap::default()) }
    }

    pub fn from_events(events: impl IntoIterator<Item = EventInfo>) -> Self {
        let catalog = Self::new();
        for event in events {
            catalog.register(event);
        }
        catalog
    }

    pub fn register(&self, event: EventInfo) {
        self.events.write().insert(event.id.clone(), event);
    }

    pub fn get(&self, id: &EventId) -> Option<EventInfo> {
        self.events.read().get(id).cloned()
    }
}

impl Default for EventCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-mark tickets whose Success record is already in the ledger, so
/// duplicate redemption is detected across process restarts. Returns the
/// number of tickets restored.
pub async fn restore_redemptions(store: &dyn TicketStore, ledger: &CheckInLedger) -> usize {
    let mut restored = 0usize;
    for ticket_id in ledger.redeemed_ticket_ids() {
        let result = store
            .compare_and_swap_status(&ticket_id, TicketStatus::Issued, TicketStatus::CheckedIn)
            .await;
        if matches!(result, Ok(CasOutcome::Swapped)) {
            restored += 1;
        }
    }
    if restored > 0 {
        info!(restored = %restored, "redemptions_restored");
    }
    restored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: &str) -> Ticket {
        Ticket::issued(
            TicketId::from(id),
            EventId::from("EVT-001"),
            "Guest Attendee",
            "guest@example.com",
            "General Admission",
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryTicketStore::new();
        store.create(ticket("TKT-001-2024")).await.unwrap();

        let fetched = store.get(&TicketId::from("TKT-001-2024")).await.unwrap();
        assert_eq!(fetched.status, TicketStatus::Issued);
        assert_eq!(fetched.holder_name, "Guest Attendee");
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryTicketStore::new();
        store.create(ticket("TKT-001-2024")).await.unwrap();
        assert_eq!(
            store.create(ticket("TKT-001-2024")).await.unwrap_err(),
            StoreError::Duplicate
        );
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let store = MemoryTicketStore::new();
        assert_eq!(
            store.get(&TicketId::from("TKT-999-2024")).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn test_cas_win_then_conflict() {
        let store = MemoryTicketStore::new();
        store.create(ticket("TKT-001-2024")).await.unwrap();
        let id = TicketId::from("TKT-001-2024");

        let first = store
            .compare_and_swap_status(&id, TicketStatus::Issued, TicketStatus::CheckedIn)
            .await
            .unwrap();
        assert_eq!(first, CasOutcome::Swapped);

        // Second attempt observes the terminal status, no mutation
        let second = store
            .compare_and_swap_status(&id, TicketStatus::Issued, TicketStatus::CheckedIn)
            .await
            .unwrap();
        assert_eq!(second, CasOutcome::Conflict(TicketStatus::CheckedIn));

        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.status, TicketStatus::CheckedIn);
    }

    #[tokio::test]
    async fn test_cas_illegal_transition_rejected() {
        let store = MemoryTicketStore::new();
        store.create(ticket("TKT-001-2024")).await.unwrap();
        let id = TicketId::from("TKT-001-2024");

        // Terminal states can never be a CAS source
        let err = store
            .compare_and_swap_status(&id, TicketStatus::CheckedIn, TicketStatus::Issued)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::InvalidTransition);
    }

    #[tokio::test]
    async fn test_cas_cancellation_race() {
        let store = MemoryTicketStore::new();
        store.create(ticket("TKT-001-2024")).await.unwrap();
        let id = TicketId::from("TKT-001-2024");

        store
            .compare_and_swap_status(&id, TicketStatus::Issued, TicketStatus::Cancelled)
            .await
            .unwrap();

        // Check-in attempt after cancellation observes Cancelled
        let outcome = store
            .compare_and_swap_status(&id, TicketStatus::Issued, TicketStatus::CheckedIn)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Conflict(TicketStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_checked_in_count_derived() {
        let store = MemoryTicketStore::new();
        for i in 1..=4 {
            store.create(ticket(&format!("TKT-00{i}-2024"))).await.unwrap();
        }
        // Ticket for a different event should not be counted
        let mut other = ticket("TKT-005-2024");
        other.event_id = EventId::from("EVT-002");
        store.create(other).await.unwrap();

        for i in 1..=2 {
            store
                .compare_and_swap_status(
                    &TicketId::from(format!("TKT-00{i}-2024").as_str()),
                    TicketStatus::Issued,
                    TicketStatus::CheckedIn,
                )
                .await
                .unwrap();
        }

        let count = store.checked_in_count(&EventId::from("EVT-001")).await.unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_concurrent_cas_single_winner() {
        use std::thread;

        let store = Arc::new(MemoryTicketStore::new());
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(store.create(ticket("TKT-001-2024"))).unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                rt.block_on(store.compare_and_swap_status(
                    &TicketId::from("TKT-001-2024"),
                    TicketStatus::Issued,
                    TicketStatus::CheckedIn,
                ))
                .unwrap()
            }));
        }

        let outcomes: Vec<CasOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = outcomes.iter().filter(|o| **o == CasOutcome::Swapped).count();
        assert_eq!(wins, 1);
        assert!(outcomes
            .iter()
            .filter(|o| **o != CasOutcome::Swapped)
            .all(|o| *o == CasOutcome::Conflict(TicketStatus::CheckedIn)));
    }

    #[tokio::test]
    async fn test_cas_callback_runs_only_on_win() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let store = MemoryTicketStore::new();
        store.create(ticket("TKT-001-2024")).await.unwrap();
        let id = TicketId::from("TKT-001-2024");
        let calls = AtomicUsize::new(0);

        let first = store
            .compare_and_swap_status_with(&id, TicketStatus::Issued, TicketStatus::CheckedIn, &|| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(first, CasOutcome::Swapped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Conflicts never invoke the callback
        let second = store
            .compare_and_swap_status_with(&id, TicketStatus::Issued, TicketStatus::CheckedIn, &|| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(second, CasOutcome::Conflict(TicketStatus::CheckedIn));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restore_redemptions_from_ledger() {
        use crate::domain::checkin::{CheckInOutcome, CheckInRecord};
        use crate::domain::ticket::ScannerId;

        let store = MemoryTicketStore::new();
        store.create(ticket("TKT-001-2024")).await.unwrap();
        store.create(ticket("TKT-002-2024")).await.unwrap();

        let ledger = CheckInLedger::in_memory();
        ledger
            .append(CheckInRecord::new(
                Some(TicketId::from("TKT-001-2024")),
                Some(EventId::from("EVT-001")),
                ScannerId::from("scanner-a"),
                1000,
                CheckInOutcome::Success,
                "checked in",
            ))
            .unwrap();

        let restored = restore_redemptions(&store, &ledger).await;
        assert_eq!(restored, 1);

        let redeemed = store.get(&TicketId::from("TKT-001-2024")).await.unwrap();
        assert_eq!(redeemed.status, TicketStatus::CheckedIn);
        let untouched = store.get(&TicketId::from("TKT-002-2024")).await.unwrap();
        assert_eq!(untouched.status, TicketStatus::Issued);
    }

    #[test]
    fn test_event_catalog() {
        let catalog = EventCatalog::from_events([EventInfo {
            id: EventId::from("EVT-001"),
            name: "Tech Summit 2024".to_string(),
            capacity: 500,
            attendees: 342,
        }]);

        let info = catalog.get(&EventId::from("EVT-001")).unwrap();
        assert_eq!(info.capacity, 500);
        assert!(catalog.get(&EventId::from("EVT-999")).is_none());
    }
}
