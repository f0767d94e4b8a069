//! Error types for check-in and registration operations.

use thiserror::Error;

use crate::types::{RegistrationId, RegistrationStatus, WorkshopId};

/// Result type alias for check-in operations.
pub type Result<T> = std::result::Result<T, CheckInError>;

/// Why a workshop does not accept self-service sign-ups right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    /// The workshop is deactivated.
    Inactive,
    /// The workshop does not take registrations.
    RegistrationNotRequired,
    /// The registration deadline has passed.
    DeadlinePassed,
}

impl std::fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Inactive => "workshop is not active",
            Self::RegistrationNotRequired => "workshop does not take registrations",
            Self::DeadlinePassed => "registration deadline has passed",
        })
    }
}

/// Error taxonomy for check-in and registration.
///
/// Rejections are detected before any mutation and leave the store
/// untouched. `Storage` and `Conflict` mean the unit of work did not commit.
/// Re-scanning an attended registration is not an error; see the runtime's
/// `CheckInOutcome::AlreadyCheckedIn`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckInError {
    // ═══════════════════════════════════════════════════════════
    // Scan Rejections
    // ═══════════════════════════════════════════════════════════

    /// The scanned token or code belongs to another workshop.
    #[error("Code belongs to workshop {found}, not workshop {expected}")]
    WrongWorkshop {
        /// Workshop the operator is checking people into
        expected: WorkshopId,
        /// Workshop referenced by the token
        found: WorkshopId,
    },

    /// Identity-bearing token for a person the directory does not know.
    #[error("No participant found for {identity}")]
    UnknownHolder {
        /// Identity carried by the token
        identity: String,
    },

    /// Token references a registration that does not exist.
    #[error("Registration not found")]
    RegistrationNotFound,

    /// Walk-in creation is disabled and the input matched nothing.
    #[error("No registration matches '{input}' and walk-ins are disabled")]
    WalkInNotAllowed {
        /// The unmatched input
        input: String,
    },

    /// Nothing was scanned.
    #[error("Empty scan input")]
    EmptyInput,

    // ═══════════════════════════════════════════════════════════
    // Lifecycle / Sign-up Rejections
    // ═══════════════════════════════════════════════════════════

    /// The requested state change is not allowed from the current status.
    #[error("Cannot move registration from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: RegistrationStatus,
        /// Requested status
        to: RegistrationStatus,
    },

    /// Workshop is full.
    #[error("Workshop {workshop_id} is full")]
    CapacityExceeded {
        /// The full workshop
        workshop_id: WorkshopId,
    },

    /// Workshop is not open for sign-up.
    #[error("Workshop {workshop_id} is closed for registration: {reason}")]
    RegistrationClosed {
        /// The closed workshop
        workshop_id: WorkshopId,
        /// Why it is closed
        reason: ClosedReason,
    },

    /// The person already holds a live registration for the workshop.
    #[error("Already registered for this workshop (registration {existing})")]
    AlreadyRegistered {
        /// The existing registration
        existing: RegistrationId,
    },

    /// Referenced workshop does not exist.
    #[error("Workshop {0} not found")]
    WorkshopNotFound(WorkshopId),

    /// Referenced registration does not exist.
    #[error("Registration {0} not found")]
    UnknownRegistration(RegistrationId),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Code generation gave up after too many collisions.
    #[error("Could not generate a unique code after {attempts} attempts")]
    CodeSpaceExhausted {
        /// Number of draws made
        attempts: u32,
    },

    /// A uniqueness constraint was hit by a concurrent writer.
    #[error("Conflicting concurrent write: {0}")]
    Conflict(String),

    /// The unit of work could not commit.
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl CheckInError {
    /// Returns `true` for rejections caused by the input or current state.
    ///
    /// Rejections are reported to operators and never retried.
    ///
    /// # Examples
    ///
    /// ```
    /// # use checkin_core::CheckInError;
    /// assert!(CheckInError::RegistrationNotFound.is_rejection());
    /// assert!(!CheckInError::Storage("down".into()).is_rejection());
    /// ```
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        !self.is_system_error()
    }

    /// Returns `true` if a fresh attempt may succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use checkin_core::CheckInError;
    /// assert!(CheckInError::Conflict("code".into()).is_retryable());
    /// assert!(!CheckInError::EmptyInput.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Conflict(_))
    }

    const fn is_system_error(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Conflict(_) | Self::CodeSpaceExhausted { .. }
        )
    }
}
