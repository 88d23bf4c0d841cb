// src/main.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod attendance;
mod bills;
mod clock;
mod config;
mod employees;
mod events;
mod ids;
mod leave;
mod loans;

mod leave_tests;

use bills::{BillFrequency, BillService, NewBill};
use clock::{Clock, SystemClock};
use config::Settings;
use employees::{EmployeeProfile, InMemoryEmployeeDirectory};
use events::{event_type, EventBus};
use leave::LeaveService;
use loans::{AccountsDecision, LoanRequest, LoanService};

#[derive(Parser)]
#[command(name = "backoffice-core", version, about = "Back-office rule engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run uninformed-leave detection over a daily attendance CSV.
    ImportAttendance {
        #[arg(long)]
        file: PathBuf,
        /// Recorded as the detector on each uninformed-leave row.
        #[arg(long, default_value = "attendance-feed")]
        detected_by: String,
    },
    /// One-shot sweep generating due bills inside the configured window.
    SweepBills,
    /// Periodic sweep loop (the cron collaborator for bill scheduling).
    WatchBills {
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },
    /// Scripted end-to-end run of the loan workflow against the demo data.
    LoanDemo {
        #[arg(long, default_value = "E101")]
        employee_id: String,
    },
}

struct Services {
    directory: Arc<InMemoryEmployeeDirectory>,
    leave: LeaveService,
    loans: LoanService,
    bills: BillService,
}

fn build_services(settings: &Settings) -> Services {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = EventBus::new();

    // Escalations are worth a log line even when nobody downstream listens.
    events.subscribe(event_type::ABSCOND_CASE_OPENED, |record| {
        warn!("Abscond escalation raised: {}", record.payload);
        Ok(())
    });

    let directory = Arc::new(InMemoryEmployeeDirectory::new());
    let leave = LeaveService::new(settings.leave_policy(), clock.clone(), events.clone());
    let loans = LoanService::new(
        settings.loan_policy(),
        clock.clone(),
        events.clone(),
        directory.clone(),
    );
    let bills = BillService::new(settings.billing_policy(), clock, events);

    Services {
        directory,
        leave,
        loans,
        bills,
    }
}

// Demo dataset standing in for the HRIS and vendor masters until a real
// persistence layer is wired up.
fn seed_demo_data(services: &Services) {
    for (id, name, salary) in [
        ("E101", "Ravi Kumar", dec!(24000)),
        ("E102", "Anil Shah", dec!(18500)),
        ("E103", "Meena Iyer", dec!(32000)),
    ] {
        services.directory.upsert(EmployeeProfile {
            id: id.to_string(),
            name: name.to_string(),
            monthly_salary: salary,
            post_id: Some("P-12".to_string()),
            branch_id: Some("BR-2".to_string()),
        });
    }

    let today = SystemClock.today();
    services.bills.create_bill(NewBill {
        name: "Office Rent".to_string(),
        category: "Rent".to_string(),
        branch_id: Some("BR-2".to_string()),
        vendor_id: Some("V-7".to_string()),
        frequency: BillFrequency::Monthly,
        amount: dec!(45000),
        start_date: today,
        first_due_date: today,
        end_date: None,
    });
    services.bills.create_bill(NewBill {
        name: "Guard Uniform Laundry".to_string(),
        category: "Operations".to_string(),
        branch_id: Some("BR-2".to_string()),
        vendor_id: Some("V-12".to_string()),
        frequency: BillFrequency::Quarterly,
        amount: dec!(8000),
        start_date: today,
        first_due_date: today,
        end_date: None,
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backoffice_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().context("Failed to load settings from environment")?;
    info!(
        "Settings: leave threshold {}, loan ceiling {}%, bill window {} days",
        settings.uninformed_leave_threshold,
        settings.loan_max_deduction_pct,
        settings.bill_due_window_days
    );

    let services = build_services(&settings);
    seed_demo_data(&services);

    let cli = Cli::parse();
    match cli.command {
        Command::ImportAttendance { file, detected_by } => {
            let records = attendance::load_attendance_csv(&file)?;
            let mut detected = 0usize;
            for record in &records {
                if services
                    .leave
                    .detect_uninformed_leave(record, &detected_by)
                    .is_some()
                {
                    detected += 1;
                }
            }
            info!(
                "Processed {} attendance record(s): {} uninformed absence(s), {} abscond case(s) on file",
                records.len(),
                detected,
                services.leave.abscond_cases().len()
            );
        }
        Command::SweepBills => {
            let generated = services.bills.schedule_bill_due_for_all();
            for due in &generated {
                info!("Generated {} '{}' due {}", due.id, due.name, due.due_date);
            }
            info!("Bill sweep complete: {} due bill(s)", generated.len());
        }
        Command::WatchBills { interval_secs } => {
            info!("Watching bills every {}s; Ctrl-C to stop", interval_secs);
            let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                let generated = services.bills.schedule_bill_due_for_all();
                info!("Sweep generated {} due bill(s)", generated.len());
            }
        }
        Command::LoanDemo { employee_id } => {
            run_loan_demo(&services, &employee_id)?;
        }
    }
    Ok(())
}

fn run_loan_demo(services: &Services, employee_id: &str) -> Result<()> {
    let loan = services
        .loans
        .create_loan_request(LoanRequest {
            employee_id: employee_id.to_string(),
            principal: dec!(12000),
            emi_months: 12,
            purpose: "Festival advance".to_string(),
        })
        .context("Loan request rejected by validation")?;

    services
        .loans
        .submit_to_accounts(&loan.id)
        .context("Loan could not be submitted to accounts")?;
    let active = services
        .loans
        .decide_loan_request(&loan.id, AccountsDecision::Approve, "accounts-demo")
        .context("Accounts decision did not apply")?;
    info!(
        "Loan {} active: {} installment(s), window {:?}..{:?}",
        active.id,
        services.loans.installments_for(&active.id).len(),
        active.start_date,
        active.end_date
    );

    // One payroll run for the first EMI month.
    let payroll_date = active
        .start_date
        .and_then(|d| d.checked_add_months(chrono::Months::new(1)))
        .unwrap_or_else(|| SystemClock.today());
    let run = services
        .loans
        .apply_loan_deductions("PAYSLIP-DEMO-1", employee_id, payroll_date);
    info!(
        "Payroll {} deducted {} across {} installment(s); balance now {:?}",
        payroll_date,
        run.total_deduction,
        run.installments.len(),
        services.loans.loan(&active.id).map(|l| l.balance)
    );
    Ok(())
}
