// src/ids.rs
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic per-store id sequence with a short type prefix (`LN-7`,
/// `EMI-31`). The source system used random ids with a collision risk;
/// sequences make ids unique and stable within a process.
#[derive(Debug)]
pub struct IdSeq {
    prefix: &'static str,
    next: AtomicU64,
}

impl IdSeq {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}
