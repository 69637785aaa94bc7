// ============================
// crates/backend-lib/src/auth/rate_limit.rs
// ============================
//! Rate limiting for login attempts.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitSettings;

/// How long a failure streak is remembered without a lockout
const FAILURE_MEMORY: Duration = Duration::from_secs(24 * 60 * 60);

/// Failed attempts recorded between sweeps of stale entries
const SWEEP_EVERY: u64 = 1024;

/// Entry in the rate limit map
#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Number of failed attempts
    failed_attempts: u32,
    /// Time of the last failed attempt
    last_failure: Instant,
    /// When the lockout expires, if locked out
    lockout_expiry: Option<Instant>,
}

/// Per-username failed login counter with temporary lockout.
///
/// Keys are normalised usernames, so unknown and existing accounts are
/// throttled identically.
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    attempts: Arc<DashMap<String, RateLimitEntry>>,
    /// Maximum number of failed attempts before lockout
    max_attempts: u32,
    /// Duration of lockout period
    lockout_duration: Duration,
    failures_since_sweep: Arc<AtomicU64>,
    sweep_every: u64,
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

impl AuthRateLimiter {
    /// Create a new auth rate limiter
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            lockout_duration,
            failures_since_sweep: Arc::new(AtomicU64::new(0)),
            sweep_every: SWEEP_EVERY,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.lockout_secs),
        )
    }

    fn key(username: &str) -> String {
        username.trim().to_lowercase()
    }

    /// Record a failed login. Returns true when this failure triggered a lockout.
    ///
    /// Every `SWEEP_EVERY` failures the map is swept, so keys sprayed by
    /// guessing random usernames do not accumulate.
    pub fn record_failed_attempt(&self, username: &str) -> bool {
        if self.failures_since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= self.sweep_every {
            self.failures_since_sweep.store(0, Ordering::Relaxed);
            self.cleanup();
        }
        let now = Instant::now();

        let mut entry = self
            .attempts
            .entry(Self::key(username))
            .or_insert_with(|| RateLimitEntry {
                failed_attempts: 0,
                last_failure: now,
                lockout_expiry: None,
            });

        // Reset if lockout has expired
        if entry.lockout_expiry.is_some_and(|expiry| now >= expiry) {
            entry.failed_attempts = 0;
            entry.lockout_expiry = None;
        }

        entry.failed_attempts += 1;
        entry.last_failure = now;

        if entry.failed_attempts >= self.max_attempts && entry.lockout_expiry.is_none() {
            entry.lockout_expiry = Some(now + self.lockout_duration);
            return true;
        }
        false
    }

    /// Forget failures after a successful login
    pub fn record_success(&self, username: &str) {
        self.attempts.remove(&Self::key(username));
    }

    /// Check whether a login for `username` may be attempted
    pub fn check_rate_limit(&self, username: &str) -> bool {
        match self.attempts.get(&Self::key(username)) {
            Some(entry) => !entry
                .lockout_expiry
                .is_some_and(|expiry| Instant::now() < expiry),
            None => true,
        }
    }

    /// Clean up expired lockouts and stale failure streaks
    pub fn cleanup(&self) {
        let now = Instant::now();

        self.attempts.retain(|_, entry| match entry.lockout_expiry {
            Some(expiry) => now < expiry,
            None => now.duration_since(entry.last_failure) < FAILURE_MEMORY,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockout_after_max_attempts() {
        let limiter = AuthRateLimiter::new(3, Duration::from_secs(60));

        assert!(!limiter.record_failed_attempt("ada"));
        assert!(!limiter.record_failed_attempt("ada"));
        assert!(limiter.check_rate_limit("ada"));
        assert!(limiter.record_failed_attempt("ada"));
        assert!(!limiter.check_rate_limit("ada"));
        // usernames are case-insensitive
        assert!(!limiter.check_rate_limit(" ADA "));
        // other accounts are unaffected
        assert!(limiter.check_rate_limit("bob"));
    }

    #[test]
    fn test_success_clears_failures() {
        let limiter = AuthRateLimiter::new(2, Duration::from_secs(60));
        limiter.record_failed_attempt("ada");
        limiter.record_success("ada");
        assert!(!limiter.record_failed_attempt("ada"));
        assert!(limiter.check_rate_limit("ada"));
    }

    #[test]
    fn test_lockout_expires() {
        let limiter = AuthRateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.record_failed_attempt("ada"));
        assert!(!limiter.check_rate_limit("ada"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check_rate_limit("ada"));
        limiter.cleanup();
        assert!(limiter.attempts.is_empty());
    }

    #[test]
    fn test_failures_sweep_stale_entries() {
        let mut limiter = AuthRateLimiter::new(1, Duration::from_millis(10));
        limiter.sweep_every = 3;

        limiter.record_failed_attempt("ada");
        limiter.record_failed_attempt("bob");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(limiter.attempts.len(), 2);

        // the third failure sweeps the two expired lockouts before counting
        assert!(limiter.record_failed_attempt("eve"));
        assert_eq!(limiter.attempts.len(), 1);
        assert!(limiter.attempts.contains_key("eve"));
        assert!(!limiter.check_rate_limit("eve"));
    }
}
