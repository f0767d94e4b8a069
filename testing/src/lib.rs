//! # Check-In Testing
//!
//! Testing utilities for workshop check-in.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryStore`]: a transactional store with failure injection
//! - [`InMemoryDirectory`]: an identity directory backed by a list
//! - [`fixtures`]: builders for workshops and people
//!
//! ## Example
//!
//! ```
//! use checkin_core::WorkshopId;
//! use checkin_testing::{fixtures, InMemoryStore};
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::new();
//! store.add_workshop(fixtures::workshop(7, Some(20))).await;
//! let snapshot = store.workshop_snapshot(WorkshopId::new(7)).await;
//! assert_eq!(snapshot.map(|w| w.current_attendees), Some(0));
//! # });
//! ```

use chrono::{DateTime, Utc};
use checkin_core::environment::Clock;

pub mod directory;
pub mod fixtures;
pub mod store;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use checkin_testing::mocks::FixedClock;
    /// use checkin_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Test helpers and utilities
pub mod helpers {
    /// Install a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`; output is captured by the test harness.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "checkin_runtime=debug,checkin_postgres=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use directory::InMemoryDirectory;
pub use mocks::{FixedClock, ManualClock, test_clock, test_epoch};
pub use store::{FailurePoint, InMemoryStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(test_epoch());
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), test_epoch() + chrono::Duration::minutes(5));
    }
}
