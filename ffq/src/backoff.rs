use std::thread;
use std::time::Duration;

/// First sleep when a poll comes up empty.
pub const INITIAL_BACKOFF_US: u64 = 100;
/// Ceiling for the doubled sleep.
pub const MAX_BACKOFF_US: u64 = 10_000;

/// Exponential sleep-based backoff: 100us doubling to 10ms, reset on
/// observed progress. Purely local, holds nothing shared while sleeping.
#[derive(Debug)]
pub struct Backoff {
    current_us: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            current_us: INITIAL_BACKOFF_US,
        }
    }

    /// Sleep for the current interval, then double it up to the ceiling.
    pub fn snooze(&mut self) {
        thread::sleep(Duration::from_micros(self.current_us));
        self.current_us = (self.current_us * 2).min(MAX_BACKOFF_US);
    }

    /// Call when progress was observed so the next wait starts small again.
    pub fn reset(&mut self) {
        self.current_us = INITIAL_BACKOFF_US;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_cap_and_resets() {
        let mut b = Backoff::new();
        assert_eq!(b.current_us, 100);
        b.current_us = MAX_BACKOFF_US / 2 + 1;
        // next snooze would sleep, so step the arithmetic directly
        b.current_us = (b.current_us * 2).min(MAX_BACKOFF_US);
        assert_eq!(b.current_us, MAX_BACKOFF_US);
        b.reset();
        assert_eq!(b.current_us, INITIAL_BACKOFF_US);
    }

    #[test]
    fn snooze_advances_interval() {
        let mut b = Backoff::new();
        b.snooze();
        assert_eq!(b.current_us, 200);
        b.snooze();
        assert_eq!(b.current_us, 400);
    }
}
