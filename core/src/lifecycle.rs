//! Registration lifecycle state machine.
//!
//! ```text
//!   (sign-up) ──► registered ──► confirmed
//!                     │  \          │  \
//!                     │   \         │   ──► attended
//!                     │    ─────────┼──► cancelled   (frees a slot)
//!                     └─────────────┴──► no_show     (keeps its slot)
//!
//!   (check-in auto/walk-in) ──────────► attended
//! ```
//!
//! `attended`, `cancelled` and `no_show` are terminal. Transitions are values:
//! [`apply`] validates the guard, stamps the record and returns the
//! [`CapacityEffect`] the caller must execute in the same unit of work.
//! Stores persist the result with a conditional update keyed on
//! [`Transition::allowed_from`], so a racing writer cannot apply the same
//! transition twice.

use chrono::{DateTime, Utc};

use crate::capacity::{CapacityEffect, CapacityLedger};
use crate::error::{CheckInError, Result};
use crate::types::{
    AttendanceMethod, Holder, NewRegistration, OperatorId, Registration, RegistrationCode,
    RegistrationStatus, UserId, WorkshopId,
};

use RegistrationStatus::{Attended, Cancelled, Confirmed, NoShow, Registered};

/// A requested state change on an existing registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// `registered → confirmed`
    Confirm {
        /// Confirmation time
        at: DateTime<Utc>,
        /// Operator, when confirmed by staff
        by: Option<OperatorId>,
    },
    /// `registered | confirmed → attended`
    Attend {
        /// Check-in time
        at: DateTime<Utc>,
        /// How the attendee was identified
        method: AttendanceMethod,
        /// Operator performing the check-in
        by: OperatorId,
    },
    /// `registered | confirmed → cancelled`
    Cancel {
        /// Operator, when cancelled by staff
        by: Option<OperatorId>,
    },
    /// `registered | confirmed → no_show`
    MarkNoShow {
        /// Operator recording the no-show
        by: OperatorId,
    },
}

impl Transition {
    /// Status the registration ends up in.
    #[must_use]
    pub const fn target(&self) -> RegistrationStatus {
        match self {
            Self::Confirm { .. } => Confirmed,
            Self::Attend { .. } => Attended,
            Self::Cancel { .. } => Cancelled,
            Self::MarkNoShow { .. } => NoShow,
        }
    }

    /// Statuses this transition may start from.
    #[must_use]
    pub const fn allowed_from(&self) -> &'static [RegistrationStatus] {
        match self {
            Self::Confirm { .. } => &[Registered],
            Self::Attend { .. } | Self::Cancel { .. } | Self::MarkNoShow { .. } => {
                &[Registered, Confirmed]
            }
        }
    }

    /// Counter change that must accompany this transition.
    #[must_use]
    pub const fn capacity_effect(&self) -> CapacityEffect {
        match self {
            Self::Cancel { .. } => CapacityLedger::on_registration_cancelled(),
            Self::Confirm { .. } | Self::Attend { .. } | Self::MarkNoShow { .. } => {
                CapacityEffect::None
            }
        }
    }

    /// Whether the guard admits a registration currently in `from`.
    #[must_use]
    pub fn permits(&self, from: RegistrationStatus) -> bool {
        self.allowed_from().contains(&from)
    }
}

/// Validate a transition against the registration's current status.
///
/// # Errors
///
/// Returns [`CheckInError::InvalidTransition`] when the guard rejects it.
pub fn check(from: RegistrationStatus, transition: &Transition) -> Result<()> {
    if transition.permits(from) {
        Ok(())
    } else {
        Err(CheckInError::InvalidTransition {
            from,
            to: transition.target(),
        })
    }
}

/// Apply a transition to a registration in place.
///
/// On error the registration is left untouched.
///
/// # Errors
///
/// Returns [`CheckInError::InvalidTransition`] when the guard rejects it.
pub fn apply(registration: &mut Registration, transition: Transition) -> Result<CapacityEffect> {
    check(registration.status, &transition)?;

    registration.status = transition.target();
    match transition {
        Transition::Confirm { at, by } => {
            registration.confirmed_at = Some(at);
            if by.is_some() {
                registration.marked_by = by;
            }
        }
        Transition::Attend { at, method, by } => {
            registration.attended_at = Some(at);
            registration.attendance_method = Some(method);
            registration.marked_by = Some(by);
        }
        Transition::Cancel { by } => {
            if by.is_some() {
                registration.marked_by = by;
            }
        }
        Transition::MarkNoShow { by } => {
            registration.marked_by = Some(by);
        }
    }

    Ok(transition.capacity_effect())
}

/// `attended_at` is set if and only if the status is `attended`.
#[must_use]
pub fn attendance_invariant_holds(registration: &Registration) -> bool {
    registration.is_attended() == registration.attended_at.is_some()
}

// ============================================================================
// Creation
// ============================================================================

/// A self-service sign-up in status `registered`.
#[must_use]
pub fn sign_up(
    workshop_id: WorkshopId,
    user_id: UserId,
    code: RegistrationCode,
    at: DateTime<Utc>,
) -> NewRegistration {
    NewRegistration {
        code,
        workshop_id,
        holder: Holder::User { user_id },
        status: Registered,
        registered_at: at,
        attended_at: None,
        attendance_method: None,
        marked_by: None,
        notes: None,
        additional_data: serde_json::Value::Null,
    }
}

/// A registration created at check-in time, directly in `attended`.
///
/// Used for auto-registration of known people and for walk-ins.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn created_attended(
    workshop_id: WorkshopId,
    holder: Holder,
    code: RegistrationCode,
    at: DateTime<Utc>,
    method: AttendanceMethod,
    operator: OperatorId,
    notes: &str,
    additional_data: serde_json::Value,
) -> NewRegistration {
    NewRegistration {
        code,
        workshop_id,
        holder,
        status: Attended,
        registered_at: at,
        attended_at: Some(at),
        attendance_method: Some(method),
        marked_by: Some(operator),
        notes: Some(notes.to_string()),
        additional_data,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::RegistrationId;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap()
    }

    fn registration(status: RegistrationStatus) -> Registration {
        let mut reg = sign_up(WorkshopId::new(1), UserId::new(2), RegistrationCode::new("ABCD2345"), now())
            .into_registration(RegistrationId::new(10));
        reg.status = status;
        if status == Attended {
            reg.attended_at = Some(now());
        }
        reg
    }

    fn attend() -> Transition {
        Transition::Attend {
            at: now(),
            method: AttendanceMethod::QrScan,
            by: OperatorId::new(5),
        }
    }

    #[test]
    fn attend_from_registered_or_confirmed() {
        for from in [Registered, Confirmed] {
            let mut reg = registration(from);
            assert_eq!(apply(&mut reg, attend()), Ok(CapacityEffect::None));
            assert_eq!(reg.status, Attended);
            assert_eq!(reg.attended_at, Some(now()));
            assert_eq!(reg.attendance_method, Some(AttendanceMethod::QrScan));
            assert_eq!(reg.marked_by, Some(OperatorId::new(5)));
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        let all = [
            Transition::Confirm { at: now(), by: None },
            attend(),
            Transition::Cancel { by: None },
            Transition::MarkNoShow { by: OperatorId::new(1) },
        ];
        for from in [Attended, Cancelled, NoShow] {
            for transition in all {
                let mut reg = registration(from);
                let before = reg.clone();
                assert_eq!(
                    apply(&mut reg, transition),
                    Err(CheckInError::InvalidTransition { from, to: transition.target() })
                );
                assert_eq!(reg, before);
            }
        }
    }

    #[test]
    fn confirm_only_from_registered() {
        let mut reg = registration(Confirmed);
        assert!(apply(&mut reg, Transition::Confirm { at: now(), by: None }).is_err());

        let mut reg = registration(Registered);
        apply(&mut reg, Transition::Confirm { at: now(), by: None }).unwrap();
        assert_eq!(reg.confirmed_at, Some(now()));
    }

    #[test]
    fn only_cancel_releases_capacity() {
        let mut cancelled = registration(Registered);
        assert_eq!(
            apply(&mut cancelled, Transition::Cancel { by: None }),
            Ok(CapacityEffect::Release)
        );

        let mut no_show = registration(Registered);
        assert_eq!(
            apply(&mut no_show, Transition::MarkNoShow { by: OperatorId::new(1) }),
            Ok(CapacityEffect::None)
        );
    }

    #[test]
    fn created_attended_satisfies_invariant() {
        let reg = created_attended(
            WorkshopId::new(1),
            Holder::WalkIn { attributed_to: OperatorId::new(4) },
            RegistrationCode::new("WALK1234"),
            now(),
            AttendanceMethod::Manual,
            OperatorId::new(4),
            "walk-in registration",
            serde_json::Value::Null,
        )
        .into_registration(RegistrationId::new(1));
        assert!(attendance_invariant_holds(&reg));
        assert_eq!(reg.status, Attended);
    }

    fn any_transition() -> impl Strategy<Value = Transition> {
        prop_oneof![
            Just(Transition::Confirm { at: now(), by: None }),
            Just(attend()),
            Just(Transition::Cancel { by: None }),
            Just(Transition::MarkNoShow { by: OperatorId::new(1) }),
        ]
    }

    proptest! {
        #[test]
        fn invariant_holds_for_any_sequence(steps in proptest::collection::vec(any_transition(), 0..8)) {
            let mut reg = registration(Registered);
            for step in steps {
                let before = reg.status;
                let result = apply(&mut reg, step);
                if before.is_terminal() {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(reg.status, before);
                }
                prop_assert!(attendance_invariant_holds(&reg));
            }
        }
    }
}
