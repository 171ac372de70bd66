//! Timing wheel
//!
//! Millisecond-resolution wheel parking paused tasks until their wake
//! time. Buckets are one millisecond wide; wakes beyond the wheel
//! horizon live in an overflow list scanned on every advance. A wake
//! time of zero means "expire on the next advance".

use crate::task::TaskId;

/// Default wheel width; must cover max(T3, dead-call wait)
pub const DEFAULT_WHEEL_WIDTH_MS: u64 = 64 * 1024;

/// Timing wheel of (task, wake-time) entries
#[derive(Debug)]
pub struct TimingWheel {
    slots: Vec<Vec<(TaskId, u64)>>,
    overflow: Vec<(TaskId, u64)>,
    ready: Vec<TaskId>,
    width: u64,
    now: u64,
}

impl TimingWheel {
    /// Create a wheel with the given width in milliseconds
    pub fn new(width_ms: u64) -> Self {
        let width = width_ms.max(1);
        Self {
            slots: vec![Vec::new(); width as usize],
            overflow: Vec::new(),
            ready: Vec::new(),
            width,
            now: 0,
        }
    }

    /// Park a task until `wake`; `wake == 0` or a wake in the past
    /// expires on the next advance
    pub fn insert(&mut self, id: TaskId, wake: u64) {
        if wake <= self.now {
            self.ready.push(id);
        } else if wake - self.now >= self.width {
            self.overflow.push((id, wake));
        } else {
            let slot = (wake % self.width) as usize;
            self.slots[slot].push((id, wake));
        }
    }

    /// Advance the wheel to `now`, returning every expired task
    pub fn advance(&mut self, now: u64) -> Vec<TaskId> {
        let mut expired: Vec<TaskId> = self.ready.drain(..).collect();

        if now > self.now {
            let steps = (now - self.now).min(self.width);
            for t in (now - steps + 1)..=now {
                let slot = (t % self.width) as usize;
                let entries = &mut self.slots[slot];
                let mut i = 0;
                while i < entries.len() {
                    if entries[i].1 <= now {
                        expired.push(entries.swap_remove(i).0);
                    } else {
                        i += 1;
                    }
                }
            }
            self.now = now;
        }

        // long-wait entries migrate in (or expire) once in range
        let mut i = 0;
        while i < self.overflow.len() {
            let (id, wake) = self.overflow[i];
            if wake <= now {
                expired.push(id);
                self.overflow.swap_remove(i);
            } else if wake - now < self.width {
                self.overflow.swap_remove(i);
                let slot = (wake % self.width) as usize;
                self.slots[slot].push((id, wake));
            } else {
                i += 1;
            }
        }

        expired
    }

    /// Number of parked entries (including stale ones not yet reaped)
    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum::<usize>() + self.overflow.len() + self.ready.len()
    }

    /// True when nothing is parked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_zero_expires_next_advance() {
        let mut wheel = TimingWheel::new(1000);
        wheel.insert(1, 0);
        assert_eq!(wheel.advance(1), vec![1]);
        assert!(wheel.advance(2).is_empty());
    }

    #[test]
    fn test_expiry_at_wake_time() {
        let mut wheel = TimingWheel::new(1000);
        wheel.advance(100);
        wheel.insert(7, 150);

        assert!(wheel.advance(149).is_empty());
        assert_eq!(wheel.advance(150), vec![7]);
    }

    #[test]
    fn test_large_jump_expires_everything_due() {
        let mut wheel = TimingWheel::new(100);
        wheel.insert(1, 10);
        wheel.insert(2, 50);
        wheel.insert(3, 99);

        let mut expired = wheel.advance(5000);
        expired.sort_unstable();
        assert_eq!(expired, vec![1, 2, 3]);
    }

    #[test]
    fn test_overflow_entry_migrates_and_expires() {
        let mut wheel = TimingWheel::new(100);
        wheel.insert(9, 250); // beyond horizon

        assert!(wheel.advance(100).is_empty());
        assert!(wheel.advance(249).is_empty());
        assert_eq!(wheel.advance(250), vec![9]);
    }

    #[test]
    fn test_past_wake_expires_next_advance() {
        let mut wheel = TimingWheel::new(100);
        wheel.advance(500);
        wheel.insert(4, 200);
        assert_eq!(wheel.advance(501), vec![4]);
    }
}
