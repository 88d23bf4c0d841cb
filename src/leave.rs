// src/leave.rs
//
// Uninformed-absence detection and abscond escalation.
//
// An absence with no approved leave covering the date becomes an
// UninformedLeave row. Three unresolved rows on consecutive calendar days
// (threshold configurable) open an AbscondCase; at most one case may be
// pending per employee at a time.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::LeavePolicy;
use crate::events::{event_type, EventBus};
use crate::ids::IdSeq;

// --- Attendance Input ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    OnLeave,
    HalfDay,
}

impl std::str::FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "on leave" | "on-leave" | "leave" => Ok(Self::OnLeave),
            "half day" | "half-day" => Ok(Self::HalfDay),
            other => Err(format!("Unknown attendance status: {}", other)),
        }
    }
}

/// One daily attendance record, as delivered by the attendance feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub employee_id: String,
    pub employee_name: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub post_id: Option<String>,
    pub branch_id: Option<String>,
}

// --- Domain Records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveResolution {
    Regularized,
    ConvertedToLeave,
    MarkedAbscond,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninformedLeave {
    pub id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub date: NaiveDate,
    pub detected_by: String,
    pub timestamp: DateTime<Utc>,
    pub post_id: Option<String>,
    pub branch_id: Option<String>,
    pub resolution: Option<LeaveResolution>,
    pub resolved_by: Option<String>,
}

impl UninformedLeave {
    pub fn is_unresolved(&self) -> bool {
        self.resolution.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AbscondStatus {
    Pending,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbscondCase {
    pub id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub start_date: NaiveDate,
    pub last_contact: NaiveDate,
    pub status: AbscondStatus,
    pub remarks: String,
    pub created_at: DateTime<Utc>,
    pub salary_cut: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
}

/// Approved-leave register entry backing the coverage check in
/// `detect_uninformed_leave`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovedLeave {
    pub employee_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

// --- Service ---

pub struct LeaveService {
    policy: LeavePolicy,
    clock: Arc<dyn Clock>,
    events: EventBus,
    leaves: Arc<Mutex<Vec<UninformedLeave>>>,
    cases: Arc<Mutex<Vec<AbscondCase>>>,
    approved: Arc<Mutex<Vec<ApprovedLeave>>>,
    leave_ids: IdSeq,
    case_ids: IdSeq,
}

impl LeaveService {
    pub fn new(policy: LeavePolicy, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            policy,
            clock,
            events,
            leaves: Arc::new(Mutex::new(Vec::new())),
            cases: Arc::new(Mutex::new(Vec::new())),
            approved: Arc::new(Mutex::new(Vec::new())),
            leave_ids: IdSeq::new("UL"),
            case_ids: IdSeq::new("AC"),
        }
    }

    pub fn record_approved_leave(&self, leave: ApprovedLeave) {
        info!(
            "Approved leave on record: {} {}..{}",
            leave.employee_id, leave.from, leave.to
        );
        self.approved.lock().unwrap().push(leave);
    }

    fn has_approved_leave(&self, employee_id: &str, date: NaiveDate) -> bool {
        self.approved
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.employee_id == employee_id && l.from <= date && date <= l.to)
    }

    /// Turn an absent attendance record into an UninformedLeave row, then run
    /// the consecutive-streak check. Returns None when the record is not an
    /// uninformed absence (present, covered by approved leave, or already
    /// detected for that date).
    pub fn detect_uninformed_leave(
        &self,
        attendance: &AttendanceRecord,
        detected_by: &str,
    ) -> Option<UninformedLeave> {
        if attendance.status != AttendanceStatus::Absent {
            return None;
        }
        if self.has_approved_leave(&attendance.employee_id, attendance.date) {
            debug!(
                "Absence covered by approved leave: {} on {}",
                attendance.employee_id, attendance.date
            );
            return None;
        }
        {
            let leaves = self.leaves.lock().unwrap();
            if leaves
                .iter()
                .any(|l| l.employee_id == attendance.employee_id && l.date == attendance.date)
            {
                debug!(
                    "Uninformed leave already recorded: {} on {}",
                    attendance.employee_id, attendance.date
                );
                return None;
            }
        }

        let leave = UninformedLeave {
            id: self.leave_ids.next(),
            employee_id: attendance.employee_id.clone(),
            employee_name: attendance.employee_name.clone(),
            date: attendance.date,
            detected_by: detected_by.to_string(),
            timestamp: self.clock.now(),
            post_id: attendance.post_id.clone(),
            branch_id: attendance.branch_id.clone(),
            resolution: None,
            resolved_by: None,
        };
        info!(
            "Uninformed leave detected: {} ({}) on {}",
            leave.employee_id, leave.id, leave.date
        );
        self.leaves.lock().unwrap().push(leave.clone());
        self.events.emit(
            event_type::UNINFORMED_LEAVE_DETECTED,
            json!({
                "leaveId": leave.id,
                "employeeId": leave.employee_id,
                "date": leave.date,
            }),
        );

        self.check_consecutive_uninformed_leaves(&attendance.employee_id);
        Some(leave)
    }

    /// Walk the employee's unresolved leaves in date order counting
    /// day-over-day gaps of exactly one day. A break in the sequence resets
    /// the streak to 1 (the first leave of a new streak still counts). At
    /// the configured threshold the streak escalates to an abscond case.
    pub fn check_consecutive_uninformed_leaves(&self, employee_id: &str) -> Option<AbscondCase> {
        let mut unresolved: Vec<UninformedLeave> = self
            .leaves
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.employee_id == employee_id && l.is_unresolved())
            .cloned()
            .collect();
        unresolved.sort_by_key(|l| l.date);

        let mut streak: Vec<UninformedLeave> = Vec::new();
        for leave in unresolved {
            let consecutive = streak
                .last()
                .map(|prev| leave.date - prev.date == Duration::days(1))
                .unwrap_or(false);
            if !consecutive {
                streak.clear();
            }
            streak.push(leave);

            if streak.len() as u32 >= self.policy.uninformed_threshold {
                return self.escalate_abscond(employee_id, &streak);
            }
        }
        None
    }

    /// Open an abscond case for the employee unless one is already pending.
    pub fn escalate_abscond(
        &self,
        employee_id: &str,
        leaves: &[UninformedLeave],
    ) -> Option<AbscondCase> {
        let first = leaves.first()?;
        if self.pending_case_for(employee_id).is_some() {
            debug!(
                "Abscond case already pending for {}, skipping escalation",
                employee_id
            );
            return None;
        }

        let start_date = leaves.iter().map(|l| l.date).min().unwrap_or(first.date);
        let case = AbscondCase {
            id: self.case_ids.next(),
            employee_id: employee_id.to_string(),
            employee_name: first.employee_name.clone(),
            start_date,
            last_contact: start_date - Duration::days(1),
            status: AbscondStatus::Pending,
            remarks: format!(
                "Auto-escalated from {} uninformed absence(s) starting {}",
                leaves.len(),
                start_date
            ),
            created_at: self.clock.now(),
            salary_cut: false,
            closed_at: None,
            closed_by: None,
        };
        warn!(
            "Abscond case opened: {} for employee {} starting {}",
            case.id, case.employee_id, case.start_date
        );
        self.cases.lock().unwrap().push(case.clone());
        self.events.emit(
            event_type::ABSCOND_CASE_OPENED,
            json!({
                "caseId": case.id,
                "employeeId": case.employee_id,
                "startDate": case.start_date,
                "evidenceLeaves": leaves.iter().map(|l| l.id.clone()).collect::<Vec<_>>(),
            }),
        );
        Some(case)
    }

    /// Resolve one uninformed leave. `MarkedAbscond` escalates immediately
    /// with the single leave as evidence, bypassing the streak threshold.
    pub fn resolve_uninformed_leave(
        &self,
        leave_id: &str,
        resolution: LeaveResolution,
        resolved_by: &str,
    ) -> Option<UninformedLeave> {
        let resolved = {
            let mut leaves = self.leaves.lock().unwrap();
            let leave = leaves.iter_mut().find(|l| l.id == leave_id)?;
            leave.resolution = Some(resolution);
            leave.resolved_by = Some(resolved_by.to_string());
            leave.clone()
        };
        info!(
            "Uninformed leave {} resolved as {:?} by {}",
            resolved.id, resolution, resolved_by
        );
        self.events.emit(
            event_type::UNINFORMED_LEAVE_RESOLVED,
            json!({
                "leaveId": resolved.id,
                "employeeId": resolved.employee_id,
                "resolution": resolution,
                "resolvedBy": resolved_by,
            }),
        );

        if resolution == LeaveResolution::MarkedAbscond {
            self.escalate_abscond(&resolved.employee_id, std::slice::from_ref(&resolved));
        }
        Some(resolved)
    }

    /// Append a timestamped remark line and close the case.
    pub fn close_abscond_case(
        &self,
        case_id: &str,
        remarks: &str,
        closed_by: &str,
    ) -> Option<AbscondCase> {
        let now = self.clock.now();
        let closed = {
            let mut cases = self.cases.lock().unwrap();
            let case = cases.iter_mut().find(|c| c.id == case_id)?;
            case.remarks
                .push_str(&format!("\n[{}] {}: {}", now.to_rfc3339(), closed_by, remarks));
            case.status = AbscondStatus::Closed;
            case.closed_at = Some(now);
            case.closed_by = Some(closed_by.to_string());
            case.clone()
        };
        info!("Abscond case {} closed by {}", closed.id, closed_by);
        self.events.emit(
            event_type::ABSCOND_CASE_CLOSED,
            json!({
                "caseId": closed.id,
                "employeeId": closed.employee_id,
                "closedBy": closed_by,
            }),
        );
        Some(closed)
    }

    // --- Lookups ---

    pub fn pending_case_for(&self, employee_id: &str) -> Option<AbscondCase> {
        self.cases
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.employee_id == employee_id && c.status == AbscondStatus::Pending)
            .cloned()
    }

    pub fn uninformed_leaves(&self) -> Vec<UninformedLeave> {
        self.leaves.lock().unwrap().clone()
    }

    pub fn abscond_cases(&self) -> Vec<AbscondCase> {
        self.cases.lock().unwrap().clone()
    }
}
