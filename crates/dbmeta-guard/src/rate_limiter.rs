//! Fixed-window rate limiting for tool calls
//!
//! One counter per limiter instance, reset whenever the wall-clock minute
//! (`epoch_seconds / 60`) changes. This is a hard cliff: once the window's
//! budget is spent every further call fails until the next minute starts.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const WINDOW_SECS: u64 = 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rate limit exceeded (limit: {limit} calls per minute)")]
pub struct RateLimitExceeded {
    pub limit: u32,
}

#[derive(Debug, Default)]
struct RateWindow {
    window_id: u64,
    count: u64,
}

/// Seconds since the Unix epoch
type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Process-wide call counter shared by every tool
pub struct RateLimiter {
    /// Calls per window; 0 disables limiting
    limit: u32,
    window: Mutex<RateWindow>,
    clock: Clock,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self::with_clock(limit, system_clock)
    }

    /// Limiter reading the time from `clock` instead of the system clock
    pub fn with_clock(limit: u32, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            limit,
            window: Mutex::new(RateWindow::default()),
            clock: Box::new(clock),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == 0
    }

    /// Count one call against the current window
    pub fn check_and_consume(&self) -> Result<(), RateLimitExceeded> {
        self.check_and_consume_at((self.clock)())
    }

    /// Count one call at an explicit time (seconds since the Unix epoch).
    ///
    /// Over-limit calls are still counted.
    pub fn check_and_consume_at(&self, epoch_secs: u64) -> Result<(), RateLimitExceeded> {
        if self.is_unlimited() {
            return Ok(());
        }

        let current = epoch_secs / WINDOW_SECS;
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        if window.window_id != current {
            window.window_id = current;
            window.count = 0;
        }
        window.count += 1;

        if window.count > u64::from(self.limit) {
            tracing::debug!(
                window_id = window.window_id,
                count = window.count,
                limit = self.limit,
                "Rate limit exceeded"
            );
            return Err(RateLimitExceeded { limit: self.limit });
        }

        Ok(())
    }

    /// Current `(window_id, count)`, for diagnostics
    pub fn usage(&self) -> (u64, u64) {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        (window.window_id, window.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    // 2024-01-01T00:00:00Z, aligned to a minute boundary
    const T0: u64 = 1_704_067_200;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            assert!(limiter.check_and_consume_at(T0 + 5).is_ok());
        }
        assert_eq!(
            limiter.check_and_consume_at(T0 + 5),
            Err(RateLimitExceeded { limit: 3 })
        );
    }

    #[test]
    fn test_over_limit_calls_still_count() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check_and_consume_at(T0).is_ok());
        assert!(limiter.check_and_consume_at(T0 + 1).is_err());
        assert!(limiter.check_and_consume_at(T0 + 2).is_err());
        assert_eq!(limiter.usage(), (T0 / 60, 3));
    }

    #[test]
    fn test_new_window_resets_immediately() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.check_and_consume_at(T0 + 58).is_ok());
        assert!(limiter.check_and_consume_at(T0 + 59).is_ok());
        assert!(limiter.check_and_consume_at(T0 + 59).is_err());

        // First second of the next minute
        assert!(limiter.check_and_consume_at(T0 + 60).is_ok());
        assert_eq!(limiter.usage(), ((T0 + 60) / 60, 1));
    }

    #[test]
    fn test_window_is_clock_aligned_not_sliding() {
        let limiter = RateLimiter::new(1);
        // Only one second apart, but on different sides of a boundary.
        assert!(limiter.check_and_consume_at(T0 + 59).is_ok());
        assert!(limiter.check_and_consume_at(T0 + 60).is_ok());
    }

    #[test]
    fn test_injected_clock_drives_windows() {
        let now = Arc::new(AtomicU64::new(T0 + 10));
        let clock = now.clone();
        let limiter = RateLimiter::with_clock(2, move || clock.load(Ordering::SeqCst));

        assert!(limiter.check_and_consume().is_ok());
        assert!(limiter.check_and_consume().is_ok());
        assert!(limiter.check_and_consume().is_err());
        assert_eq!(limiter.usage(), (T0 / 60, 3));

        now.store(T0 + 60, Ordering::SeqCst);
        assert!(limiter.check_and_consume().is_ok());
        assert_eq!(limiter.usage(), ((T0 + 60) / 60, 1));
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let limiter = RateLimiter::new(0);
        assert!(limiter.is_unlimited());
        for _ in 0..1_000 {
            assert!(limiter.check_and_consume_at(T0).is_ok());
        }
        assert_eq!(limiter.usage(), (0, 0));
    }

    #[test]
    fn test_error_message_includes_limit() {
        let err = RateLimitExceeded { limit: 60 };
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn test_shared_across_threads() {
        let limiter = Arc::new(RateLimiter::new(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| limiter.check_and_consume_at(T0).is_ok())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
        assert_eq!(limiter.usage().1, 80);
    }
}
