//! Monotonic time source (C1).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Strictly non-decreasing millisecond timestamp, unaffected by wall-clock
/// adjustment. Every deadline in the core (scheduler fire times, executor
/// `delay_until`, de-dup bookkeeping) is derived from this trait alone.
pub trait MonotonicClock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Process-relative clock backed by `Instant`.
#[derive(Debug, Default)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl MonotonicClock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Test double that only advances when told to. Lets timing-sensitive
/// scenarios (scheduler phase preservation, executor delay windows) be
/// asserted exactly instead of racing a real sleep.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    ms: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) -> u64 {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl MonotonicClock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::new();
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(clock.advance(20), 20);
        assert_eq!(clock.now_ms(), 20);
        clock.set(1000);
        assert_eq!(clock.now_ms(), 1000);
    }
}
