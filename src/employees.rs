// src/employees.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub id: String,
    pub name: String,
    pub monthly_salary: Decimal,
    pub post_id: Option<String>,
    pub branch_id: Option<String>,
}

/// Salary lookup boundary. The payroll master lives outside this core; loan
/// validation only needs the gross monthly salary for one employee at a time.
pub trait SalaryDirectory: Send + Sync {
    fn monthly_salary(&self, employee_id: &str) -> Option<Decimal>;
}

/// In-memory directory used by the binary and by tests. Swapping in an HRIS
/// or database client means implementing `SalaryDirectory` elsewhere.
#[derive(Clone, Default)]
pub struct InMemoryEmployeeDirectory {
    profiles: Arc<Mutex<HashMap<String, EmployeeProfile>>>,
}

impl InMemoryEmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: EmployeeProfile) {
        info!(
            "Registering employee profile: {} ({})",
            profile.id, profile.name
        );
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    pub fn get(&self, employee_id: &str) -> Option<EmployeeProfile> {
        self.profiles.lock().unwrap().get(employee_id).cloned()
    }
}

impl SalaryDirectory for InMemoryEmployeeDirectory {
    fn monthly_salary(&self, employee_id: &str) -> Option<Decimal> {
        self.get(employee_id).map(|p| p.monthly_salary)
    }
}
