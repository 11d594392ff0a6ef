use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

static LAST_CREATED_MICROS: AtomicI64 = AtomicI64::new(0);

/// Returns a creation timestamp strictly greater than any previously
/// returned by this process, at microsecond resolution.
///
/// Release history is ordered by `created_`, so two packages saved within
/// the same clock tick must still compare in insertion order.
pub fn next_created() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_CREATED_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_CREATED_MICROS.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
            Err(actual) => last = actual,
        }
    }
}
