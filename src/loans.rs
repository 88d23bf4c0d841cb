// src/loans.rs
//
// Staff loans: statutory ceiling validation, the two-stage accounts
// approval workflow, EMI installment scheduling and payroll deduction.
//
// State machine:
//   Requested/Draft -> SentToAccounts -> ApprovedByAccounts (loan Active)
//                                     -> RejectedByAccounts (loan Rejected)
//   Active -> installments deducted until the balance hits zero -> Closed.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::LoanPolicy;
use crate::employees::SalaryDirectory;
use crate::events::{event_type, EventBus};
use crate::ids::IdSeq;

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    Requested,
    Active,
    Rejected,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountsRequestStatus {
    Draft,
    SentToAccounts,
    ApprovedByAccounts,
    RejectedByAccounts,
    Processing,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub employee_id: String,
    pub principal: Decimal,
    pub emi_months: u32,
    pub status: LoanStatus,
    pub accounts_request_status: AccountsRequestStatus,
    pub balance: Decimal,
    pub purpose: String,
    pub requested_on: DateTime<Utc>,
    pub approved_on: Option<DateTime<Utc>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstallmentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanInstallment {
    pub id: String,
    pub loan_id: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub status: InstallmentStatus,
    pub payslip_id: Option<String>,
    pub paid_on: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct LoanRequest {
    pub employee_id: String,
    pub principal: Decimal,
    pub emi_months: u32,
    pub purpose: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountsDecision {
    Approve,
    Reject,
}

/// Result of one payroll deduction run for one employee.
#[derive(Debug, Clone, Default)]
pub struct DeductionRun {
    pub total_deduction: Decimal,
    pub installments: Vec<LoanInstallment>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoanError {
    #[error("Loan exceeds allowed limits")]
    ExceedsAllowedLimits,
}

// --- Service ---

pub struct LoanService {
    policy: LoanPolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
    salaries: Arc<dyn SalaryDirectory>,
    loans: Arc<Mutex<Vec<Loan>>>,
    installments: Arc<Mutex<Vec<LoanInstallment>>>,
    loan_ids: IdSeq,
    installment_ids: IdSeq,
}

impl LoanService {
    pub fn new(
        policy: LoanPolicy,
        clock: Arc<dyn Clock>,
        events: EventBus,
        salaries: Arc<dyn SalaryDirectory>,
    ) -> Self {
        Self {
            policy,
            clock,
            events,
            salaries,
            loans: Arc::new(Mutex::new(Vec::new())),
            installments: Arc::new(Mutex::new(Vec::new())),
            loan_ids: IdSeq::new("LN"),
            installment_ids: IdSeq::new("EMI"),
        }
    }

    /// Statutory wage-protection check: the monthly deduction may not exceed
    /// the configured percentage of the employee's gross monthly salary.
    pub fn validate_loan_request(&self, req: &LoanRequest) -> bool {
        if req.principal <= dec!(0) {
            warn!("Loan validation failed: non-positive principal {}", req.principal);
            return false;
        }
        if req.emi_months == 0 {
            warn!("Loan validation failed: zero EMI months");
            return false;
        }
        let monthly_deduction = req.principal / Decimal::from(req.emi_months);
        let salary = match self.salaries.monthly_salary(&req.employee_id) {
            Some(s) => s,
            None => {
                warn!(
                    "Loan validation failed: no salary on record for {}",
                    req.employee_id
                );
                return false;
            }
        };
        let ceiling = salary * self.policy.max_deduction_pct / dec!(100);
        if monthly_deduction > ceiling {
            warn!(
                "Loan validation failed for {}: monthly deduction {} exceeds ceiling {} ({}% of {})",
                req.employee_id, monthly_deduction, ceiling, self.policy.max_deduction_pct, salary
            );
            return false;
        }
        true
    }

    pub fn create_loan_request(&self, req: LoanRequest) -> Result<Loan, LoanError> {
        if !self.validate_loan_request(&req) {
            return Err(LoanError::ExceedsAllowedLimits);
        }
        let loan = Loan {
            id: self.loan_ids.next(),
            employee_id: req.employee_id,
            principal: req.principal,
            emi_months: req.emi_months,
            status: LoanStatus::Requested,
            accounts_request_status: AccountsRequestStatus::Draft,
            balance: req.principal,
            purpose: req.purpose,
            requested_on: self.clock.now(),
            approved_on: None,
            start_date: None,
            end_date: None,
        };
        info!(
            "Loan requested: {} by {} for {} over {} months",
            loan.id, loan.employee_id, loan.principal, loan.emi_months
        );
        self.loans.lock().unwrap().push(loan.clone());
        self.events.emit(
            event_type::LOAN_REQUESTED,
            json!({
                "loanId": loan.id,
                "employeeId": loan.employee_id,
                "principal": loan.principal,
                "emiMonths": loan.emi_months,
            }),
        );
        Ok(loan)
    }

    /// Requested/Draft -> SentToAccounts. None when the loan is missing or
    /// not in the submittable state.
    pub fn submit_to_accounts(&self, loan_id: &str) -> Option<Loan> {
        let submitted = {
            let mut loans = self.loans.lock().unwrap();
            let loan = loans.iter_mut().find(|l| l.id == loan_id)?;
            if loan.status != LoanStatus::Requested
                || loan.accounts_request_status != AccountsRequestStatus::Draft
            {
                warn!(
                    "Loan {} not submittable: status {:?}/{:?}",
                    loan_id, loan.status, loan.accounts_request_status
                );
                return None;
            }
            loan.accounts_request_status = AccountsRequestStatus::SentToAccounts;
            loan.clone()
        };
        info!("Loan {} sent to accounts", submitted.id);
        self.events.emit(
            event_type::LOAN_SENT_TO_ACCOUNTS,
            json!({ "loanId": submitted.id, "employeeId": submitted.employee_id }),
        );
        Some(submitted)
    }

    /// Single accounts-gate transition. Approval activates the loan, stamps
    /// the repayment window and schedules the installment plan; rejection is
    /// terminal. None when the loan is missing or not awaiting a decision.
    pub fn decide_loan_request(
        &self,
        loan_id: &str,
        decision: AccountsDecision,
        actor: &str,
    ) -> Option<Loan> {
        let now = self.clock.now();
        let today = self.clock.today();
        let decided = {
            let mut loans = self.loans.lock().unwrap();
            let loan = loans.iter_mut().find(|l| l.id == loan_id)?;
            if loan.accounts_request_status != AccountsRequestStatus::SentToAccounts {
                warn!(
                    "Loan {} not awaiting accounts decision: {:?}",
                    loan_id, loan.accounts_request_status
                );
                return None;
            }
            match decision {
                AccountsDecision::Approve => {
                    loan.status = LoanStatus::Active;
                    loan.accounts_request_status = AccountsRequestStatus::ApprovedByAccounts;
                    loan.approved_on = Some(now);
                    loan.start_date = Some(today);
                    loan.end_date = today.checked_add_months(Months::new(loan.emi_months));
                }
                AccountsDecision::Reject => {
                    loan.status = LoanStatus::Rejected;
                    loan.accounts_request_status = AccountsRequestStatus::RejectedByAccounts;
                }
            }
            loan.clone()
        };

        match decision {
            AccountsDecision::Approve => {
                info!("Loan {} approved by {}", decided.id, actor);
                self.events.emit(
                    event_type::LOAN_APPROVED,
                    json!({ "loanId": decided.id, "employeeId": decided.employee_id, "actor": actor }),
                );
                let scheduled = self.schedule_loan_deductions(&decided.id);
                debug!("Scheduled {} installments for {}", scheduled.len(), decided.id);
            }
            AccountsDecision::Reject => {
                info!("Loan {} rejected by {}", decided.id, actor);
                self.events.emit(
                    event_type::LOAN_REJECTED,
                    json!({ "loanId": decided.id, "employeeId": decided.employee_id, "actor": actor }),
                );
            }
        }
        self.loan(&decided.id)
    }

    /// Build the EMI plan for an active loan: one installment per month,
    /// amounts rounded to 2dp with the final installment absorbing the
    /// remainder so the plan sums exactly to the principal. Empty unless the
    /// loan is Active; an existing plan is returned untouched.
    pub fn schedule_loan_deductions(&self, loan_id: &str) -> Vec<LoanInstallment> {
        let loan = match self.loan(loan_id) {
            Some(l) => l,
            None => return Vec::new(),
        };
        if loan.status != LoanStatus::Active {
            debug!(
                "Not scheduling deductions: loan {} is {:?}",
                loan_id, loan.status
            );
            return Vec::new();
        }
        let existing = self.installments_for(loan_id);
        if !existing.is_empty() {
            warn!(
                "Installment plan already exists for loan {} ({} rows)",
                loan_id,
                existing.len()
            );
            return existing;
        }
        let start = match loan.start_date {
            Some(d) => d,
            None => {
                warn!("Active loan {} has no start date", loan_id);
                return Vec::new();
            }
        };

        let per_month = (loan.principal / Decimal::from(loan.emi_months)).round_dp(2);
        let mut plan = Vec::with_capacity(loan.emi_months as usize);
        for i in 1..=loan.emi_months {
            let amount = if i == loan.emi_months {
                // Final installment absorbs the rounding remainder.
                loan.principal - per_month * Decimal::from(loan.emi_months - 1)
            } else {
                per_month
            };
            let due_date = match start.checked_add_months(Months::new(i)) {
                Some(d) => d,
                None => {
                    warn!("Due date overflow scheduling loan {}", loan_id);
                    return Vec::new();
                }
            };
            plan.push(LoanInstallment {
                id: self.installment_ids.next(),
                loan_id: loan_id.to_string(),
                amount,
                due_date,
                status: InstallmentStatus::Pending,
                payslip_id: None,
                paid_on: None,
            });
        }
        info!(
            "Installment plan for loan {}: {} x {} (final {})",
            loan_id,
            loan.emi_months,
            per_month,
            plan.last().map(|p| p.amount).unwrap_or(per_month)
        );
        self.installments.lock().unwrap().extend(plan.clone());
        plan
    }

    /// Apply the payroll month's pending installments for every active loan
    /// of the employee. Marks them Paid against the payslip, reduces loan
    /// balances and closes loans that reach exactly zero.
    pub fn apply_loan_deductions(
        &self,
        payslip_id: &str,
        employee_id: &str,
        payroll_date: NaiveDate,
    ) -> DeductionRun {
        let active_loan_ids: Vec<String> = self
            .loans
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.employee_id == employee_id && l.status == LoanStatus::Active)
            .map(|l| l.id.clone())
            .collect();
        if active_loan_ids.is_empty() {
            debug!("No active loans for {} in payroll run", employee_id);
            return DeductionRun::default();
        }

        let mut run = DeductionRun::default();
        let mut closed_loans: Vec<Loan> = Vec::new();
        let paid_on = self.clock.today();

        for loan_id in active_loan_ids {
            let mut loan_total = dec!(0);
            {
                let mut installments = self.installments.lock().unwrap();
                for inst in installments.iter_mut().filter(|i| {
                    i.loan_id == loan_id
                        && i.status == InstallmentStatus::Pending
                        && i.due_date.year() == payroll_date.year()
                        && i.due_date.month() == payroll_date.month()
                }) {
                    inst.status = InstallmentStatus::Paid;
                    inst.payslip_id = Some(payslip_id.to_string());
                    inst.paid_on = Some(paid_on);
                    loan_total += inst.amount;
                    run.installments.push(inst.clone());
                }
            }
            if loan_total == dec!(0) {
                continue;
            }
            run.total_deduction += loan_total;

            let mut loans = self.loans.lock().unwrap();
            if let Some(loan) = loans.iter_mut().find(|l| l.id == loan_id) {
                loan.balance -= loan_total;
                info!(
                    "Deducted {} from loan {} (balance {})",
                    loan_total, loan.id, loan.balance
                );
                if loan.balance == dec!(0) {
                    loan.status = LoanStatus::Closed;
                    loan.accounts_request_status = AccountsRequestStatus::Completed;
                    closed_loans.push(loan.clone());
                }
            }
        }

        if run.total_deduction > dec!(0) {
            self.events.emit(
                event_type::LOAN_DEDUCTION_APPLIED,
                json!({
                    "payslipId": payslip_id,
                    "employeeId": employee_id,
                    "totalDeduction": run.total_deduction,
                    "installments": run.installments.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
                }),
            );
        }
        for loan in closed_loans {
            info!("Loan {} fully repaid and closed", loan.id);
            self.events.emit(
                event_type::LOAN_CLOSED,
                json!({ "loanId": loan.id, "employeeId": loan.employee_id }),
            );
        }
        run
    }

    // --- Lookups ---

    pub fn loan(&self, loan_id: &str) -> Option<Loan> {
        self.loans
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == loan_id)
            .cloned()
    }

    pub fn loans_for(&self, employee_id: &str) -> Vec<Loan> {
        self.loans
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.employee_id == employee_id)
            .cloned()
            .collect()
    }

    pub fn installments_for(&self, loan_id: &str) -> Vec<LoanInstallment> {
        self.installments
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .cloned()
            .collect()
    }
}
