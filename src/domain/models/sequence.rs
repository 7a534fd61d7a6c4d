//! Process-wide identity and time sources for orders.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;

use super::types::OrderId;

/// Hands out order ids from an atomic counter, so ids never collide within a process.
#[derive(Debug)]
pub struct OrderIdGenerator {
    next: AtomicU64,
}

impl OrderIdGenerator {
    pub fn new(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> OrderId {
        OrderId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Wall clock in nanoseconds that never repeats or goes backwards.
///
/// Two calls always return strictly increasing values, even when the system clock
/// is adjusted or two submissions land within the same nanosecond.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_nanos(&self) -> i64 {
        let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MIN);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}
