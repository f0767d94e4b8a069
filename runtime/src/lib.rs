//! # Check-In Runtime
//!
//! The imperative shell around `checkin-core`: a [`CheckInService`] that
//! drives a transactional [`CheckInStore`] and an [`IdentityDirectory`].
//!
//! ## Operations
//!
//! - [`CheckInService::resolve_and_check_in`]: resolve a scanned or typed
//!   string to a registration and mark it attended (see [`resolver`])
//! - [`CheckInService::register`], [`confirm`](CheckInService::confirm),
//!   [`cancel`](CheckInService::cancel),
//!   [`mark_no_show`](CheckInService::mark_no_show) and
//!   [`qr_content`](CheckInService::qr_content) (see [`registration`])
//! - [`CheckInService::search_participants`] (see [`search`])
//!
//! Every mutation runs inside one unit of work and is retried on transient
//! storage failures according to the configured [`RetryPolicy`].
//!
//! ## Example
//!
//! ```
//! use checkin_core::token::encode_field_composed;
//! use checkin_core::{OperatorId, WorkshopId};
//! use checkin_runtime::CheckInService;
//! use checkin_testing::{fixtures, test_clock, test_epoch, InMemoryDirectory, InMemoryStore};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::new();
//! store.add_workshop(fixtures::workshop(7, Some(20))).await;
//! let directory = InMemoryDirectory::with_people([fixtures::person(1, "a@b.com", "Ada")]);
//!
//! let service = CheckInService::new(store, directory, Arc::new(test_clock()));
//! let scanned = encode_field_composed(WorkshopId::new(7), "a@b.com", test_epoch(), None);
//! let result = service
//!     .resolve_and_check_in(&scanned, WorkshopId::new(7), OperatorId::new(900))
//!     .await;
//! assert!(result.success);
//! # });
//! ```

use std::str::FromStr;
use std::sync::Arc;

use checkin_core::code::CodeGenerator;
use checkin_core::environment::Clock;
use checkin_core::store::{CheckInStore, IdentityDirectory};
use thiserror::Error;

pub mod metrics;
pub mod registration;
pub mod resolver;
pub mod retry;
pub mod search;

pub use resolver::{CheckInOutcome, CheckInPath, Resolution};
pub use retry::RetryPolicy;

/// What to do with a scan that matches no token format and no stored code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkInPolicy {
    /// Create an attended walk-in registration attributed to the operator.
    #[default]
    Create,
    /// Reject the scan with `WalkInNotAllowed`; nothing is written.
    Reject,
}

impl WalkInPolicy {
    /// Configuration string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Reject => "reject",
        }
    }
}

/// Unrecognized walk-in policy string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown walk-in policy '{0}' (expected 'create' or 'reject')")]
pub struct UnknownWalkInPolicy(pub String);

impl FromStr for WalkInPolicy {
    type Err = UnknownWalkInPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "reject" => Ok(Self::Reject),
            other => Err(UnknownWalkInPolicy(other.to_string())),
        }
    }
}

/// Configuration for a [`CheckInService`].
///
/// # Example
///
/// ```
/// use checkin_runtime::{RetryPolicy, ServiceConfig, WalkInPolicy};
///
/// let config = ServiceConfig::default()
///     .with_walk_in_policy(WalkInPolicy::Reject)
///     .with_retry_policy(RetryPolicy::none());
/// assert_eq!(config.walk_in_policy, WalkInPolicy::Reject);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Handling of unmatched literal scans
    pub walk_in_policy: WalkInPolicy,
    /// Registration code generation
    pub codes: CodeGenerator,
    /// Retry policy for units of work
    pub retry: RetryPolicy,
}

impl ServiceConfig {
    /// Set the walk-in policy
    #[must_use]
    pub const fn with_walk_in_policy(mut self, policy: WalkInPolicy) -> Self {
        self.walk_in_policy = policy;
        self
    }

    /// Set the code generator
    #[must_use]
    pub const fn with_codes(mut self, codes: CodeGenerator) -> Self {
        self.codes = codes;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

/// Check-in and registration service.
///
/// Cheap to share behind an `Arc`; every operation takes `&self` and
/// concurrent calls are serialized per workshop by the store.
pub struct CheckInService<S, D> {
    store: S,
    directory: D,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl<S, D> CheckInService<S, D>
where
    S: CheckInStore,
    D: IdentityDirectory,
{
    /// Create a service with default configuration.
    #[must_use]
    pub fn new(store: S, directory: D, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, directory, clock, ServiceConfig::default())
    }

    /// Create a service with custom configuration.
    #[must_use]
    pub fn with_config(store: S, directory: D, clock: Arc<dyn Clock>, config: ServiceConfig) -> Self {
        Self {
            store,
            directory,
            clock,
            config,
        }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The identity directory.
    pub const fn directory(&self) -> &D {
        &self.directory
    }

    /// Active configuration.
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_in_policy_parses_case_insensitively() {
        assert_eq!("Create".parse(), Ok(WalkInPolicy::Create));
        assert_eq!(" reject ".parse(), Ok(WalkInPolicy::Reject));
        assert_eq!(
            "ask".parse::<WalkInPolicy>(),
            Err(UnknownWalkInPolicy("ask".into()))
        );
    }

    #[test]
    fn default_config_creates_walk_ins() {
        let config = ServiceConfig::default();
        assert_eq!(config.walk_in_policy, WalkInPolicy::Create);
        assert_eq!(config.codes, CodeGenerator::default());
        assert_eq!(config.retry.max_retries, 3);
    }
}
