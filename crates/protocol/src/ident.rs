//! Request identifier generation.
//!
//! Identifiers name one logical invocation and must stay constant across its
//! retries; the daemon keys its duplicate filter on them. They combine a
//! nanosecond clock reading with a per-process host identity term and a
//! process-local sequence, xored together. Collisions across processes are
//! tolerated as rare anomalies rather than excluded by construction.

use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU64 = AtomicU64::new(1);
static HOST_TERM: OnceLock<u64> = OnceLock::new();

/// Large odd multiplier spreading the sequence counter across the word.
const SEQUENCE_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

fn host_term() -> u64 {
    *HOST_TERM.get_or_init(|| {
        let mut hasher = std::hash::DefaultHasher::new();
        std::process::id().hash(&mut hasher);
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos()
            .hash(&mut hasher);
        hasher.finish()
    })
}

/// Returns a fresh nonzero request identifier.
///
/// Uniqueness is per logical invocation: callers generate one identifier and
/// reuse it for every retry of that invocation.
#[must_use]
pub fn next_request_id() -> u64 {
    loop {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = nanos ^ host_term() ^ sequence.wrapping_mul(SEQUENCE_SPREAD);
        if id != 0 {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identifiers_are_nonzero() {
        for _ in 0..1000 {
            assert_ne!(next_request_id(), 0);
        }
    }

    #[test]
    fn identifiers_are_distinct_within_a_process() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(next_request_id()), "identifier repeated");
        }
    }

    #[test]
    fn host_term_is_stable_for_the_process() {
        assert_eq!(host_term(), host_term());
    }
}
