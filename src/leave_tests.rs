// src/leave_tests.rs

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use once_cell::sync::Lazy;

    use crate::clock::{d, FixedClock};
    use crate::config::LeavePolicy;
    use crate::events::{event_type, EventBus};
    use crate::leave::*;

    // Opt-in log output when debugging a failing test (RUST_LOG).
    static LOGGING: Lazy<()> = Lazy::new(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });

    fn setup(threshold: u32) -> (LeaveService, FixedClock, EventBus) {
        Lazy::force(&LOGGING);
        let clock = FixedClock::at("2024-03-10 08:00:00");
        let events = EventBus::new();
        let service = LeaveService::new(
            LeavePolicy {
                uninformed_threshold: threshold,
            },
            Arc::new(clock.clone()),
            events.clone(),
        );
        (service, clock, events)
    }

    fn attendance(employee_id: &str, date: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            employee_id: employee_id.to_string(),
            employee_name: format!("Employee {}", employee_id),
            date: d(date),
            status,
            post_id: Some("P-12".to_string()),
            branch_id: Some("BR-2".to_string()),
        }
    }

    fn absent(employee_id: &str, date: &str) -> AttendanceRecord {
        attendance(employee_id, date, AttendanceStatus::Absent)
    }

    #[test]
    fn absence_without_cover_creates_uninformed_leave() {
        let (service, _clock, events) = setup(3);

        let leave = service
            .detect_uninformed_leave(&absent("E1", "2024-03-04"), "attendance-feed")
            .expect("uninformed leave expected");

        assert_eq!(leave.employee_id, "E1");
        assert_eq!(leave.date, d("2024-03-04"));
        assert_eq!(leave.detected_by, "attendance-feed");
        assert!(leave.is_unresolved());
        assert_eq!(
            events
                .records_of_type(event_type::UNINFORMED_LEAVE_DETECTED)
                .len(),
            1
        );
    }

    #[test]
    fn present_and_covered_absences_are_ignored() {
        let (service, _clock, _events) = setup(3);

        assert!(service
            .detect_uninformed_leave(
                &attendance("E1", "2024-03-04", AttendanceStatus::Present),
                "feed"
            )
            .is_none());

        service.record_approved_leave(ApprovedLeave {
            employee_id: "E1".to_string(),
            from: d("2024-03-04"),
            to: d("2024-03-06"),
        });
        assert!(service
            .detect_uninformed_leave(&absent("E1", "2024-03-05"), "feed")
            .is_none());
        assert!(service.uninformed_leaves().is_empty());
    }

    #[test]
    fn same_day_redetection_is_a_noop() {
        let (service, _clock, _events) = setup(3);

        assert!(service
            .detect_uninformed_leave(&absent("E1", "2024-03-04"), "feed")
            .is_some());
        assert!(service
            .detect_uninformed_leave(&absent("E1", "2024-03-04"), "feed")
            .is_none());
        assert_eq!(service.uninformed_leaves().len(), 1);
    }

    #[test]
    fn three_consecutive_days_open_exactly_one_abscond_case() {
        let (service, _clock, events) = setup(3);

        for date in ["2024-03-04", "2024-03-05", "2024-03-06"] {
            service.detect_uninformed_leave(&absent("E1", date), "feed").unwrap();
        }

        let cases = service.abscond_cases();
        assert_eq!(cases.len(), 1);
        let case = &cases[0];
        assert_eq!(case.status, AbscondStatus::Pending);
        assert_eq!(case.start_date, d("2024-03-04"));
        assert_eq!(case.last_contact, d("2024-03-03"));
        assert!(!case.salary_cut);

        // A fourth absence must not open a second case while one is pending.
        service.detect_uninformed_leave(&absent("E1", "2024-03-07"), "feed").unwrap();
        assert!(service.check_consecutive_uninformed_leaves("E1").is_none());
        assert_eq!(service.abscond_cases().len(), 1);
        assert_eq!(
            events.records_of_type(event_type::ABSCOND_CASE_OPENED).len(),
            1
        );
    }

    #[test]
    fn gap_resets_streak_to_one_not_zero() {
        let (service, _clock, _events) = setup(3);

        // 4th, 5th, then a gap, then 7th and 8th: longest streak is 2.
        for date in ["2024-03-04", "2024-03-05", "2024-03-07", "2024-03-08"] {
            service.detect_uninformed_leave(&absent("E1", date), "feed").unwrap();
        }
        assert!(service.abscond_cases().is_empty());

        // The 9th completes a fresh 7-8-9 streak; the case starts at the 7th,
        // proving the post-gap leave counted as 1 rather than 0.
        service.detect_uninformed_leave(&absent("E1", "2024-03-09"), "feed").unwrap();
        let cases = service.abscond_cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].start_date, d("2024-03-07"));
    }

    #[test]
    fn resolved_leaves_do_not_count_towards_the_streak() {
        let (service, _clock, _events) = setup(3);

        let mut ids = Vec::new();
        for date in ["2024-03-04", "2024-03-05"] {
            ids.push(
                service
                    .detect_uninformed_leave(&absent("E1", date), "feed")
                    .unwrap()
                    .id,
            );
        }
        service
            .resolve_uninformed_leave(&ids[1], LeaveResolution::Regularized, "hr-admin")
            .expect("leave should resolve");

        // Third consecutive day, but the middle one is regularized.
        service
            .detect_uninformed_leave(&absent("E1", "2024-03-06"), "feed")
            .unwrap();
        assert!(service.abscond_cases().is_empty());
    }

    #[test]
    fn streaks_are_tracked_per_employee() {
        let (service, _clock, _events) = setup(3);

        for date in ["2024-03-04", "2024-03-05"] {
            service.detect_uninformed_leave(&absent("E1", date), "feed").unwrap();
            service.detect_uninformed_leave(&absent("E2", date), "feed").unwrap();
        }
        service.detect_uninformed_leave(&absent("E2", "2024-03-06"), "feed").unwrap();

        assert!(service.pending_case_for("E1").is_none());
        assert!(service.pending_case_for("E2").is_some());
    }

    #[test]
    fn marked_abscond_escalates_from_a_single_leave() {
        let (service, _clock, events) = setup(3);

        let leave = service
            .detect_uninformed_leave(&absent("E1", "2024-03-04"), "feed")
            .unwrap();
        let resolved = service
            .resolve_uninformed_leave(&leave.id, LeaveResolution::MarkedAbscond, "hr-admin")
            .expect("leave should resolve");
        assert_eq!(resolved.resolution, Some(LeaveResolution::MarkedAbscond));
        assert_eq!(resolved.resolved_by.as_deref(), Some("hr-admin"));

        let case = service.pending_case_for("E1").expect("case expected");
        assert_eq!(case.start_date, d("2024-03-04"));
        assert_eq!(
            events.records_of_type(event_type::ABSCOND_CASE_OPENED).len(),
            1
        );
    }

    #[test]
    fn resolving_unknown_leave_returns_none() {
        let (service, _clock, _events) = setup(3);
        assert!(service
            .resolve_uninformed_leave("UL-999", LeaveResolution::Regularized, "hr-admin")
            .is_none());
        assert!(service.close_abscond_case("AC-999", "n/a", "hr-admin").is_none());
    }

    #[test]
    fn closing_a_case_appends_remark_and_allows_a_new_escalation() {
        let (service, _clock, events) = setup(3);

        for date in ["2024-03-04", "2024-03-05", "2024-03-06"] {
            service.detect_uninformed_leave(&absent("E1", date), "feed").unwrap();
        }
        let case = service.pending_case_for("E1").unwrap();
        let closed = service
            .close_abscond_case(&case.id, "Employee returned with medical certificate", "hr-admin")
            .expect("case should close");

        assert_eq!(closed.status, AbscondStatus::Closed);
        assert!(closed.remarks.contains("medical certificate"));
        assert!(closed.remarks.contains("hr-admin"));
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.closed_by.as_deref(), Some("hr-admin"));
        assert_eq!(
            events.records_of_type(event_type::ABSCOND_CASE_CLOSED).len(),
            1
        );

        // The pending-case invariant only holds while a case is open; a new
        // unresolved streak may escalate again.
        for date in ["2024-04-01", "2024-04-02", "2024-04-03"] {
            service.detect_uninformed_leave(&absent("E1", date), "feed").unwrap();
        }
        let cases = service.abscond_cases();
        assert_eq!(cases.len(), 2);
        assert!(service.pending_case_for("E1").is_some());
    }

    #[test]
    fn threshold_is_configurable() {
        let (service, _clock, _events) = setup(2);

        service.detect_uninformed_leave(&absent("E1", "2024-03-04"), "feed").unwrap();
        assert!(service.pending_case_for("E1").is_none());
        service.detect_uninformed_leave(&absent("E1", "2024-03-05"), "feed").unwrap();
        assert!(service.pending_case_for("E1").is_some());
    }
}
