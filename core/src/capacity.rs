//! Capacity Ledger: sign-up gating and occupancy counter effects.
//!
//! `current_attendees` is a write-through counter. Every new registration
//! consumes a slot, whatever its initial status, and only cancellation
//! releases one. A no-show keeps its slot. The ledger itself never touches
//! storage: it returns [`CapacityEffect`] values that the unit of work applies
//! atomically alongside the registration write that caused them.

use chrono::{DateTime, Utc};

use crate::error::{CheckInError, ClosedReason, Result};
use crate::types::Workshop;

/// Counter change to apply together with a registration write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityEffect {
    /// Counter unchanged
    None,
    /// `current_attendees += 1`
    Consume,
    /// `current_attendees -= 1` (never below zero)
    Release,
}

impl CapacityEffect {
    /// Signed counter delta.
    #[must_use]
    pub const fn delta(&self) -> i32 {
        match self {
            Self::None => 0,
            Self::Consume => 1,
            Self::Release => -1,
        }
    }
}

/// Capacity rules for a workshop.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityLedger;

impl CapacityLedger {
    /// Whether a self-service sign-up may be accepted right now.
    ///
    /// Check-in paths do not consult this: scanning someone in at the door
    /// is never refused for capacity.
    #[must_use]
    pub fn can_accept(workshop: &Workshop, now: DateTime<Utc>) -> bool {
        Self::check_sign_up(workshop, now).is_ok()
    }

    /// Like [`can_accept`](Self::can_accept), with the reason for refusal.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::RegistrationClosed`] when the workshop is inactive,
    ///   takes no registrations, or its deadline has passed
    /// - [`CheckInError::CapacityExceeded`] when it is full
    pub fn check_sign_up(workshop: &Workshop, now: DateTime<Utc>) -> Result<()> {
        let closed = |reason| CheckInError::RegistrationClosed {
            workshop_id: workshop.id,
            reason,
        };

        if !workshop.is_active {
            return Err(closed(ClosedReason::Inactive));
        }
        if !workshop.requires_registration {
            return Err(closed(ClosedReason::RegistrationNotRequired));
        }
        if workshop.registration_deadline.is_some_and(|deadline| now > deadline) {
            return Err(closed(ClosedReason::DeadlinePassed));
        }
        if Self::remaining(workshop) == Some(0) {
            return Err(CheckInError::CapacityExceeded {
                workshop_id: workshop.id,
            });
        }
        Ok(())
    }

    /// Free slots, or `None` for an unlimited workshop.
    #[must_use]
    pub fn remaining(workshop: &Workshop) -> Option<u32> {
        workshop
            .max_attendees
            .map(|max| max.saturating_sub(workshop.current_attendees))
    }

    /// Effect of creating a registration (sign-up, auto-registration, walk-in).
    #[must_use]
    pub const fn on_registration_created() -> CapacityEffect {
        CapacityEffect::Consume
    }

    /// Effect of cancelling a registration. The only decrement path.
    #[must_use]
    pub const fn on_registration_cancelled() -> CapacityEffect {
        CapacityEffect::Release
    }

    /// Apply an effect to an in-memory workshop projection.
    pub const fn apply(workshop: &mut Workshop, effect: CapacityEffect) {
        workshop.current_attendees = match effect {
            CapacityEffect::None => workshop.current_attendees,
            CapacityEffect::Consume => workshop.current_attendees.saturating_add(1),
            CapacityEffect::Release => workshop.current_attendees.saturating_sub(1),
        };
    }
}
