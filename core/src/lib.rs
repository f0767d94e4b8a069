//! # Check-In Core
//!
//! Domain types and pure rules for workshop check-in.
//!
//! This crate holds everything that can be decided without I/O:
//!
//! - **Token Codec** ([`token`]): turns a scanned or typed string into a
//!   [`DecodedToken`], trying each known format in a fixed priority order.
//! - **Registration Lifecycle** ([`lifecycle`]): the guarded state machine
//!   `registered → confirmed → attended`, plus `cancelled` and `no_show`.
//! - **Capacity Ledger** ([`capacity`]): sign-up gating and the counter
//!   effects that accompany registration writes.
//! - **Code Generator** ([`code`]): collision-checked opaque codes.
//! - **Storage seams** ([`store`]): the unit-of-work and identity traits that
//!   the runtime drives and the postgres/testing crates implement.
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell: transitions return effect
//!   descriptions ([`CapacityEffect`]) that a unit of work executes.
//! - Dependency injection via traits ([`environment::Clock`],
//!   [`store::CheckInStore`], [`store::IdentityDirectory`]).
//! - Closed sum types for token formats and statuses, matched exhaustively.
//!
//! ## Example
//!
//! ```
//! use checkin_core::token::{self, DecodedToken};
//!
//! let decoded = token::decode("a@b.com|7");
//! assert!(matches!(decoded, Some(DecodedToken::DelimitedPair(_))));
//! ```

pub mod capacity;
pub mod code;
pub mod error;
pub mod lifecycle;
pub mod store;
pub mod token;
pub mod types;

// Re-export commonly used types
pub use capacity::{CapacityEffect, CapacityLedger};
pub use chrono::{DateTime, Utc};
pub use error::{CheckInError, Result};
pub use token::DecodedToken;
pub use types::{
    AttendanceMethod, Holder, HolderIdentity, OperatorId, Registration, RegistrationCode,
    RegistrationId, RegistrationStatus, UserId, Workshop, WorkshopId,
};

/// Environment module - Dependency injection traits
///
/// All sources of non-determinism the core needs are abstracted behind
/// traits and injected by the caller.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use checkin_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
