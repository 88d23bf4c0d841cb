// src/events.rs
//
// Process-wide synchronous pub/sub with an append-only audit log. Every
// business event the rule modules raise goes through here; subscribers are
// invoked in registration order and a failing subscriber never aborts the
// emit (its error is logged and swallowed).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

// --- Event Type Keys ---
pub mod event_type {
    pub const UNINFORMED_LEAVE_DETECTED: &str = "hr.leave.uninformed_detected";
    pub const UNINFORMED_LEAVE_RESOLVED: &str = "hr.leave.uninformed_resolved";
    pub const ABSCOND_CASE_OPENED: &str = "hr.abscond.case_opened";
    pub const ABSCOND_CASE_CLOSED: &str = "hr.abscond.case_closed";

    pub const LOAN_REQUESTED: &str = "accounts.loan.requested";
    pub const LOAN_SENT_TO_ACCOUNTS: &str = "accounts.loan.sent_to_accounts";
    pub const LOAN_APPROVED: &str = "accounts.loan.approved";
    pub const LOAN_REJECTED: &str = "accounts.loan.rejected";
    pub const LOAN_DEDUCTION_APPLIED: &str = "accounts.loan.deduction_applied";
    pub const LOAN_CLOSED: &str = "accounts.loan.closed";

    pub const BILL_CREATED: &str = "office.bill.created";
    pub const BILL_DUE_GENERATED: &str = "office.bill.due_generated";
    pub const BILL_PAID: &str = "office.bill.paid";
}

/// One recorded event occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub seq: u64,
    pub event_type: String,
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}

/// Subscriber callback. Errors are logged by the bus and do not propagate.
pub type Handler = Arc<dyn Fn(&EventRecord) -> anyhow::Result<()> + Send + Sync>;

/// Token returned by `subscribe`, accepted by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
pub struct EventBus {
    log: Arc<Mutex<Vec<EventRecord>>>,
    subscribers: Arc<Mutex<HashMap<String, Vec<(SubscriptionId, Handler)>>>>,
    next_seq: Arc<AtomicU64>,
    next_token: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_seq: Arc::new(AtomicU64::new(1)),
            next_token: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Record and dispatch an event. Dispatch is synchronous, in
    /// registration order, with subscriber errors swallowed.
    pub fn emit(&self, event_type: &str, payload: Value) -> EventRecord {
        let record = EventRecord {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            event_type: event_type.to_string(),
            payload,
            emitted_at: Utc::now(),
        };
        debug!("Event emitted: {} (seq {})", record.event_type, record.seq);
        self.log.lock().unwrap().push(record.clone());

        // Snapshot handlers so a subscriber can unsubscribe (itself or
        // others) without deadlocking on the subscriber map.
        let handlers: Vec<Handler> = {
            let subs = self.subscribers.lock().unwrap();
            subs.get(event_type)
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            if let Err(e) = handler(&record) {
                warn!(
                    "Subscriber error for event {} (seq {}): {:#}",
                    record.event_type, record.seq, e
                );
            }
        }
        record
    }

    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&EventRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.subscribers
            .lock()
            .unwrap()
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns true when the subscription existed and was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock().unwrap();
        let mut removed = false;
        for list in subs.values_mut() {
            let before = list.len();
            list.retain(|(sub_id, _)| *sub_id != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Snapshot of the audit log, oldest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.log.lock().unwrap().clone()
    }

    pub fn records_of_type(&self, event_type: &str) -> Vec<EventRecord> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.event_type == event_type)
            .cloned()
            .collect()
    }
}
