//! Time source for expiry checks.

use chrono::{DateTime, Utc};

/// Supplies the current time to the token validator.
///
/// Production code uses [`SystemClock`]; tests pin time with [`FixedClock`] so
/// validation stays a pure function of `(token, now, key)`.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Creates a clock that always reports `at`.
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Creates a clock at the given Unix timestamp (seconds).
    ///
    /// Out-of-range timestamps fall back to the Unix epoch.
    pub fn from_timestamp(secs: i64) -> Self {
        Self(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::from_timestamp(1_700_000_000);
        assert_eq!(clock.now().timestamp(), 1_700_000_000);
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
