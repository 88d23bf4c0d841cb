// src/clock.rs
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Time source injected into every service so business rules stay
/// deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Production clock.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replay tooling.
#[derive(Clone)]
pub struct FixedClock {
    current: Arc<Mutex<NaiveDateTime>>,
}

impl FixedClock {
    pub fn at(datetime_str: &str) -> Self {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .unwrap_or_else(|_| panic!("Invalid datetime string: {}", datetime_str));
        Self {
            current: Arc::new(Mutex::new(dt)),
        }
    }

    pub fn set(&self, datetime_str: &str) {
        *self.current.lock().unwrap() =
            NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
                .unwrap_or_else(|_| panic!("Invalid datetime string: {}", datetime_str));
    }

    pub fn advance(&self, duration: chrono::Duration) {
        *self.current.lock().unwrap() += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.current.lock().unwrap().and_utc()
    }
}

/// Parse a `%Y-%m-%d` date or panic with the offending input. Test helper.
pub fn d(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
}
