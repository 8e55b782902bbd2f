//! Timed polling loop
//!
//! Change detection is a plain sleep-and-check loop instead of an OS
//! wait/notify primitive. A change is noticed at most one interval after it
//! happens, and a timeout is reported no earlier than the deadline and no
//! later than one interval past it.

use std::thread;
use std::time::{Duration, Instant};

/// Default time between checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of [`Poller::poll_until`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled<T> {
    /// The check produced a value
    Ready(T),
    /// The deadline passed first; carries the time actually waited
    TimedOut(Duration),
}

/// Sleep-poll loop with a fixed interval
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `check` until it returns `Some` or `timeout` elapses
    ///
    /// The check always runs at least once. Errors from the check end the
    /// loop immediately.
    pub fn poll_until<T, E, F>(&self, timeout: Duration, mut check: F) -> Result<Polled<T>, E>
    where
        F: FnMut() -> Result<Option<T>, E>,
    {
        let start = Instant::now();
        let mut attempts = 0u64;

        loop {
            attempts += 1;
            if let Some(value) = check()? {
                tracing::trace!(attempts = attempts, "Poll succeeded");
                return Ok(Polled::Ready(value));
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                tracing::trace!(attempts = attempts, elapsed_ms = elapsed.as_millis() as u64, "Poll timed out");
                return Ok(Polled::TimedOut(elapsed));
            }

            thread::sleep(self.interval.min(timeout - elapsed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn test_ready_immediately() {
        let poller = Poller::default();
        let start = Instant::now();
        let outcome = poller
            .poll_until(Duration::from_secs(5), || Ok::<_, Infallible>(Some(42)))
            .unwrap();
        assert_eq!(outcome, Polled::Ready(42));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_timeout_bounds() {
        let interval = Duration::from_millis(10);
        let timeout = Duration::from_millis(100);
        let poller = Poller::new(interval);

        let start = Instant::now();
        let outcome = poller
            .poll_until(timeout, || Ok::<Option<()>, Infallible>(None))
            .unwrap();
        let elapsed = start.elapsed();

        assert!(matches!(outcome, Polled::TimedOut(waited) if waited >= timeout));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + interval * 5);
    }

    #[test]
    fn test_zero_timeout_checks_once() {
        let mut calls = 0;
        let outcome = Poller::default()
            .poll_until(Duration::ZERO, || {
                calls += 1;
                Ok::<Option<()>, Infallible>(None)
            })
            .unwrap();
        assert!(matches!(outcome, Polled::TimedOut(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_ready_after_some_attempts() {
        let mut calls = 0;
        let outcome = Poller::new(Duration::from_millis(1))
            .poll_until(Duration::from_secs(5), || {
                calls += 1;
                Ok::<_, Infallible>((calls == 3).then_some(calls))
            })
            .unwrap();
        assert_eq!(outcome, Polled::Ready(3));
    }

    #[test]
    fn test_check_error_stops_loop() {
        let mut calls = 0;
        let result: Result<Polled<()>, &str> =
            Poller::default().poll_until(Duration::from_secs(5), || {
                calls += 1;
                Err("boom")
            });
        assert_eq!(result, Err("boom"));
        assert_eq!(calls, 1);
    }
}
