// src/attendance.rs
//
// Attendance feed import: one row per employee per day, as exported by the
// biometric/roster system.
//
//   employee_id,employee_name,date,status,post_id,branch_id
//   E101,Ravi Kumar,2024-03-04,Absent,P-12,BR-2

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::leave::{AttendanceRecord, AttendanceStatus};

#[derive(Debug, Deserialize)]
struct AttendanceRow {
    employee_id: String,
    employee_name: String,
    date: NaiveDate,
    status: String,
    #[serde(default)]
    post_id: Option<String>,
    #[serde(default)]
    branch_id: Option<String>,
}

pub fn load_attendance_csv(path: &Path) -> Result<Vec<AttendanceRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open attendance file {}", path.display()))?;

    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<AttendanceRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed attendance row {}", line + 1))?;
        let status: AttendanceStatus = row
            .status
            .parse()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Row {} for employee {}", line + 1, row.employee_id))?;
        records.push(AttendanceRecord {
            employee_id: row.employee_id,
            employee_name: row.employee_name,
            date: row.date,
            status,
            post_id: row.post_id.filter(|s| !s.is_empty()),
            branch_id: row.branch_id.filter(|s| !s.is_empty()),
        });
    }
    debug!(
        "Loaded {} attendance record(s) from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_feed_with_optional_columns() {
        let mut file = tempfile_path("attendance.csv");
        writeln!(
            file.1,
            "employee_id,employee_name,date,status,post_id,branch_id\n\
             E101,Ravi Kumar,2024-03-04,Absent,P-12,BR-2\n\
             E102,Anil Shah,2024-03-04,Present,,"
        )
        .unwrap();
        drop(file.1);

        let records = load_attendance_csv(&file.0).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, AttendanceStatus::Absent);
        assert_eq!(records[0].post_id.as_deref(), Some("P-12"));
        assert_eq!(records[1].status, AttendanceStatus::Present);
        assert!(records[1].post_id.is_none());

        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn unknown_status_is_an_error() {
        let mut file = tempfile_path("attendance_bad.csv");
        writeln!(
            file.1,
            "employee_id,employee_name,date,status,post_id,branch_id\n\
             E101,Ravi Kumar,2024-03-04,Vanished,,"
        )
        .unwrap();
        drop(file.1);

        assert!(load_attendance_csv(&file.0).is_err());
        std::fs::remove_file(&file.0).ok();
    }

    fn tempfile_path(name: &str) -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!("backoffice-{}-{}", std::process::id(), name));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
