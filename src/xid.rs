//! A process-wide counter supplying both RPC transaction IDs (`xid`) and the
//! `AUTH_SYS` credential "stamp".
//!
//! The reference implementation seeds a single monotonic counter from the
//! wall clock at process start and reuses it for both purposes; correlating
//! xid and stamp this way costs nothing and there is no reason for this
//! crate to use two separate counters.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Returns the next value in the process-wide XID/stamp sequence.
///
/// The first call in a process seeds the counter from the wall clock;
/// subsequent calls increment it. Wrapping on overflow is fine - RFC 5531
/// only requires the transaction ID to be unlikely to collide with another
/// outstanding call, not globally unique.
pub(crate) fn next() -> u32 {
    let mut current = COUNTER.load(Ordering::Relaxed);
    if current == 0 {
        let s = seed();
        match COUNTER.compare_exchange(0, s, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => current = s,
            Err(v) => current = v,
        }
    }

    loop {
        let next = current.wrapping_add(1);
        match COUNTER.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(v) => current = v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_sequence_is_monotonic_increasing() {
        let a = next();
        let b = next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_concurrent_calls_never_collide() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..256).map(|_| next()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(seen.insert(v), "duplicate xid {v} generated concurrently");
            }
        }
    }
}
