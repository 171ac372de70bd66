//! Wall-clock helpers
//!
//! The scheduler runs on milliseconds from a process-local monotonic
//! origin; tests drive ticks with hand-picked values instead.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the first call in this process
pub fn monotonic_ms() -> u64 {
    let origin = ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_millis() as u64
}

/// Seconds since the Unix epoch
pub fn unix_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_ms_does_not_go_backwards() {
        let a = monotonic_ms();
        let b = monotonic_ms();
        assert!(b >= a);
    }
}
