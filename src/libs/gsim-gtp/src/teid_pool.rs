//! TEID Pool
//!
//! Allocates local Tunnel Endpoint Identifiers. TEIDs are handed out
//! monotonically and never reused while the owning tunnel is live, so the
//! local TEID doubles as the inbound demultiplexing key.

use crate::error::{GtpError, GtpResult};
use std::sync::atomic::{AtomicU32, Ordering};

/// TEID Pool for allocating unique TEIDs
#[derive(Debug)]
pub struct TeidPool {
    counter: AtomicU32,
    base: u32,
    max: u32,
}

impl TeidPool {
    /// Create a new TEID pool with the default range (1..0xFFFFFFFF)
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(1),
            base: 1,
            max: u32::MAX,
        }
    }

    /// Create a new TEID pool with a custom range
    pub fn with_range(base: u32, max: u32) -> GtpResult<Self> {
        if base == 0 || base >= max {
            return Err(GtpError::ResourceExhausted(format!(
                "invalid TEID range {base}..{max}"
            )));
        }
        Ok(Self {
            counter: AtomicU32::new(base),
            base,
            max,
        })
    }

    /// Allocate a new TEID
    pub fn allocate(&self) -> GtpResult<u32> {
        let teid = self.counter.fetch_add(1, Ordering::Relaxed);
        if teid >= self.max {
            self.counter.store(self.base, Ordering::Relaxed);
            let teid = self.counter.fetch_add(1, Ordering::Relaxed);
            if teid >= self.max {
                return Err(GtpError::ResourceExhausted(
                    "TEID pool exhausted".to_string(),
                ));
            }
            return Ok(teid);
        }
        Ok(teid)
    }

    /// Next TEID that would be allocated
    pub fn peek_next(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TeidPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_monotonic() {
        let pool = TeidPool::new();
        let t1 = pool.allocate().unwrap();
        let t2 = pool.allocate().unwrap();
        let t3 = pool.allocate().unwrap();
        assert!(t1 < t2 && t2 < t3);
    }

    #[test]
    fn test_custom_range() {
        let pool = TeidPool::with_range(1000, 2000).unwrap();
        assert_eq!(pool.allocate().unwrap(), 1000);
        assert_eq!(pool.peek_next(), 1001);
    }

    #[test]
    fn test_invalid_range() {
        assert!(TeidPool::with_range(0, 100).is_err());
        assert!(TeidPool::with_range(100, 50).is_err());
    }

    #[test]
    fn test_uniqueness_over_many_allocations() {
        let pool = TeidPool::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(pool.allocate().unwrap()));
        }
    }
}
