// src/bills.rs
//
// Recurring bills and their dated due-bill instances. A Bill is the
// template (frequency, amount, next_due_date); each billing cycle produces
// one DueBill and advances the template's next_due_date by one cycle.

use std::sync::{Arc, Mutex};

use chrono::{Datelike, Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::BillingPolicy;
use crate::events::{event_type, EventBus};
use crate::ids::IdSeq;

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Biannual,
    Yearly,
}

impl BillFrequency {
    /// The next cycle date after `from`. None on calendar overflow.
    pub fn advance(&self, from: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => from.checked_add_days(chrono::Days::new(1)),
            Self::Weekly => from.checked_add_days(chrono::Days::new(7)),
            Self::Monthly => from.checked_add_months(Months::new(1)),
            Self::Quarterly => from.checked_add_months(Months::new(3)),
            Self::Biannual => from.checked_add_months(Months::new(6)),
            Self::Yearly => from.checked_add_months(Months::new(12)),
        }
    }

    /// Human-readable cycle label used in due-bill names: month-year for
    /// short cycles, quarter/half-year labels, or the bare year.
    pub fn period_label(&self, due: NaiveDate) -> String {
        match self {
            Self::Daily | Self::Weekly | Self::Monthly => due.format("%B %Y").to_string(),
            Self::Quarterly => format!("Q{} {}", (due.month() - 1) / 3 + 1, due.year()),
            Self::Biannual => format!("H{} {}", if due.month() <= 6 { 1 } else { 2 }, due.year()),
            Self::Yearly => due.year().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Active,
    Suspended,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: String,
    pub name: String,
    pub category: String,
    pub branch_id: Option<String>,
    pub vendor_id: Option<String>,
    pub frequency: BillFrequency,
    pub amount: Decimal,
    pub next_due_date: NaiveDate,
    pub status: BillStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DueBillStatus {
    Upcoming,
    Paid,
    Processing,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueBill {
    pub id: String,
    pub bill_id: String,
    pub name: String,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub status: DueBillStatus,
    pub payment_reference: Option<String>,
    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewBill {
    pub name: String,
    pub category: String,
    pub branch_id: Option<String>,
    pub vendor_id: Option<String>,
    pub frequency: BillFrequency,
    pub amount: Decimal,
    pub start_date: NaiveDate,
    pub first_due_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// Optional payment metadata attached on a status change.
#[derive(Debug, Clone, Default)]
pub struct PaymentMeta {
    pub payment_reference: Option<String>,
    pub payment_date: Option<NaiveDate>,
}

// --- Service ---

pub struct BillService {
    policy: BillingPolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
    bills: Arc<Mutex<Vec<Bill>>>,
    due_bills: Arc<Mutex<Vec<DueBill>>>,
    bill_ids: IdSeq,
    due_ids: IdSeq,
}

impl BillService {
    pub fn new(policy: BillingPolicy, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            policy,
            clock,
            events,
            bills: Arc::new(Mutex::new(Vec::new())),
            due_bills: Arc::new(Mutex::new(Vec::new())),
            bill_ids: IdSeq::new("BILL"),
            due_ids: IdSeq::new("DUE"),
        }
    }

    /// Store a new recurring bill and generate its first due instance.
    pub fn create_bill(&self, data: NewBill) -> Bill {
        let bill = Bill {
            id: self.bill_ids.next(),
            name: data.name,
            category: data.category,
            branch_id: data.branch_id,
            vendor_id: data.vendor_id,
            frequency: data.frequency,
            amount: data.amount,
            next_due_date: data.first_due_date,
            status: BillStatus::Active,
            start_date: data.start_date,
            end_date: data.end_date,
        };
        info!(
            "Bill created: {} '{}' {:?} {} first due {}",
            bill.id, bill.name, bill.frequency, bill.amount, bill.next_due_date
        );
        self.bills.lock().unwrap().push(bill.clone());
        self.events.emit(
            event_type::BILL_CREATED,
            json!({ "billId": bill.id, "name": bill.name, "amount": bill.amount }),
        );

        self.schedule_bill_due(&bill.id);
        self.bill(&bill.id).unwrap_or(bill)
    }

    /// Generate the next due instance for one bill and advance its
    /// next_due_date one cycle. The cycle base is the later of the stored
    /// next_due_date and today, so a long-suspended bill does not backfill
    /// stale cycles. None when the bill is missing or not active.
    pub fn schedule_bill_due(&self, bill_id: &str) -> Option<DueBill> {
        let today = self.clock.today();
        let due = {
            let mut bills = self.bills.lock().unwrap();
            let bill = bills.iter_mut().find(|b| b.id == bill_id)?;
            if bill.status != BillStatus::Active {
                debug!("Bill {} is {:?}, not scheduling", bill_id, bill.status);
                return None;
            }
            let base = bill.next_due_date.max(today);
            let next = match bill.frequency.advance(base) {
                Some(d) => d,
                None => {
                    warn!("Calendar overflow advancing bill {}", bill_id);
                    return None;
                }
            };
            let due = DueBill {
                id: self.due_ids.next(),
                bill_id: bill.id.clone(),
                name: format!("{} - {}", bill.name, bill.frequency.period_label(base)),
                due_date: base,
                amount: bill.amount,
                status: DueBillStatus::Upcoming,
                payment_reference: None,
                payment_date: None,
            };
            bill.next_due_date = next;
            due
        };
        info!(
            "Due bill generated: {} '{}' due {} for {}",
            due.id, due.name, due.due_date, due.amount
        );
        self.due_bills.lock().unwrap().push(due.clone());
        self.events.emit(
            event_type::BILL_DUE_GENERATED,
            json!({
                "dueBillId": due.id,
                "billId": due.bill_id,
                "dueDate": due.due_date,
                "amount": due.amount,
            }),
        );
        Some(due)
    }

    /// Set a due bill's status, attaching payment metadata when given.
    /// Emits a bill-paid event on the transition into Paid.
    pub fn update_due_bill_status(
        &self,
        due_bill_id: &str,
        status: DueBillStatus,
        meta: PaymentMeta,
    ) -> Option<DueBill> {
        let updated = {
            let mut due_bills = self.due_bills.lock().unwrap();
            let due = due_bills.iter_mut().find(|d| d.id == due_bill_id)?;
            let was_paid = due.status == DueBillStatus::Paid;
            due.status = status;
            if let Some(reference) = meta.payment_reference {
                due.payment_reference = Some(reference);
            }
            if let Some(date) = meta.payment_date {
                due.payment_date = Some(date);
            }
            (due.clone(), was_paid)
        };
        info!("Due bill {} status -> {:?}", updated.0.id, status);
        if status == DueBillStatus::Paid && !updated.1 {
            self.events.emit(
                event_type::BILL_PAID,
                json!({
                    "dueBillId": updated.0.id,
                    "billId": updated.0.bill_id,
                    "amount": updated.0.amount,
                    "paymentReference": updated.0.payment_reference,
                }),
            );
        }
        Some(updated.0)
    }

    /// Batch sweep for the periodic trigger: generate due instances for
    /// every active bill whose next_due_date falls within the configured
    /// window (default 30 days).
    pub fn schedule_bill_due_for_all(&self) -> Vec<DueBill> {
        let horizon = self.clock.today() + Duration::days(self.policy.due_window_days);
        let candidates: Vec<String> = self
            .bills
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.status == BillStatus::Active && b.next_due_date <= horizon)
            .map(|b| b.id.clone())
            .collect();
        debug!(
            "Bill sweep: {} candidate(s) within {} days",
            candidates.len(),
            self.policy.due_window_days
        );
        candidates
            .iter()
            .filter_map(|id| self.schedule_bill_due(id))
            .collect()
    }

    /// Suspend, expire or reactivate a bill template. Suspended and expired
    /// bills are skipped by scheduling until reactivated.
    pub fn set_bill_status(&self, bill_id: &str, status: BillStatus) -> Option<Bill> {
        let mut bills = self.bills.lock().unwrap();
        let bill = bills.iter_mut().find(|b| b.id == bill_id)?;
        info!("Bill {} status {:?} -> {:?}", bill_id, bill.status, status);
        bill.status = status;
        Some(bill.clone())
    }

    // --- Lookups ---

    pub fn bill(&self, bill_id: &str) -> Option<Bill> {
        self.bills
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == bill_id)
            .cloned()
    }

    pub fn bills(&self) -> Vec<Bill> {
        self.bills.lock().unwrap().clone()
    }

    pub fn due_bills(&self) -> Vec<DueBill> {
        self.due_bills.lock().unwrap().clone()
    }

    pub fn due_bills_for(&self, bill_id: &str) -> Vec<DueBill> {
        self.due_bills
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.bill_id == bill_id)
            .cloned()
            .collect()
    }
}
