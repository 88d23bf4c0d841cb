// src/config.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Raw environment-sourced settings. Every key has a statutory or house
/// default so the binary runs without a `.env` file.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Consecutive uninformed-absence days before an abscond case is opened.
    #[serde(default = "default_uninformed_leave_threshold")]
    pub uninformed_leave_threshold: u32,

    /// Statutory wage-protection ceiling: maximum percentage of the monthly
    /// salary that may go towards loan deductions.
    #[serde(default = "default_loan_max_deduction_pct")]
    pub loan_max_deduction_pct: Decimal,

    /// Bills due within this many days are picked up by the periodic sweep.
    #[serde(default = "default_bill_due_window_days")]
    pub bill_due_window_days: i64,
}

fn default_uninformed_leave_threshold() -> u32 {
    3
}

fn default_loan_max_deduction_pct() -> Decimal {
    dec!(50)
}

fn default_bill_due_window_days() -> i64 {
    30
}

impl Settings {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        envy::from_env::<Settings>()
    }

    pub fn leave_policy(&self) -> LeavePolicy {
        LeavePolicy {
            uninformed_threshold: self.uninformed_leave_threshold,
        }
    }

    pub fn loan_policy(&self) -> LoanPolicy {
        LoanPolicy {
            max_deduction_pct: self.loan_max_deduction_pct,
        }
    }

    pub fn billing_policy(&self) -> BillingPolicy {
        BillingPolicy {
            due_window_days: self.bill_due_window_days,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uninformed_leave_threshold: default_uninformed_leave_threshold(),
            loan_max_deduction_pct: default_loan_max_deduction_pct(),
            bill_due_window_days: default_bill_due_window_days(),
        }
    }
}

// Per-module policy slices, passed into each service at construction so no
// service reads ambient global config.

#[derive(Debug, Clone, Copy)]
pub struct LeavePolicy {
    pub uninformed_threshold: u32,
}

impl Default for LeavePolicy {
    fn default() -> Self {
        Settings::default().leave_policy()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoanPolicy {
    pub max_deduction_pct: Decimal,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Settings::default().loan_policy()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BillingPolicy {
    pub due_window_days: i64,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Settings::default().billing_policy()
    }
}
