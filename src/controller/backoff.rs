//! # Fibonacci Backoff
//!
//! Progressive retry delays for failed reconciliations. Each resource keeps its own
//! sequence so one failing GardenerCluster never slows down the others.
//!
//! With `min = 15s` and `max = 600s` the sequence is
//! 15s, 15s, 30s, 45s, 75s, 120s, 195s, 315s, 510s, then capped at 600s.

/// Fibonacci sequence of delays, in seconds, bounded by `[min, max]`
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    max_secs: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        let max_secs = max_secs.max(min_secs);
        Self {
            max_secs,
            previous: 0,
            current: min_secs,
        }
    }

    /// Next delay in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let delay = self.current.min(self.max_secs);
        if self.current < self.max_secs {
            let next = self.previous.saturating_add(self.current);
            self.previous = self.current;
            self.current = next;
        }
        delay
    }
}
