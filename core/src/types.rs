//! Domain types for workshop check-in.
//!
//! Identifiers, the [`Registration`] record, the capacity-relevant
//! [`Workshop`] projection, and the read-side views returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CheckInError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw database identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Get the raw identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

int_id!(
    /// Unique identifier for a workshop
    WorkshopId
);
int_id!(
    /// Unique identifier for a registration
    RegistrationId
);
int_id!(
    /// Unique identifier for a known person (attendee)
    UserId
);
int_id!(
    /// Identifier of the staff operator performing an action
    OperatorId
);

/// Opaque registration code.
///
/// Always stored in normalized form (trimmed, ASCII uppercase), so two codes
/// compare equal exactly when a lookup would match them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationCode(String);

impl RegistrationCode {
    /// Normalize and wrap a code.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    /// Borrow the normalized code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this value looks like a scannable code rather than free text.
    ///
    /// Code-shaped values are 4 to 64 ASCII alphanumerics or dashes.
    #[must_use]
    pub fn is_code_shaped(&self) -> bool {
        (4..=64).contains(&self.0.len())
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    }
}

impl fmt::Display for RegistrationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle state of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Signed up (initial state for self-service sign-up)
    Registered,
    /// Attendance confirmed ahead of the workshop (optional step)
    Confirmed,
    /// Present at the workshop
    Attended,
    /// Withdrawn; frees a capacity slot
    Cancelled,
    /// Did not show up; keeps its capacity slot
    NoShow,
}

impl RegistrationStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Registered,
        Self::Confirmed,
        Self::Attended,
        Self::Cancelled,
        Self::NoShow,
    ];

    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Confirmed => "confirmed",
            Self::Attended => "attended",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, CheckInError> {
        match s {
            "registered" => Ok(Self::Registered),
            "confirmed" => Ok(Self::Confirmed),
            "attended" => Ok(Self::Attended),
            "cancelled" => Ok(Self::Cancelled),
            "no_show" => Ok(Self::NoShow),
            _ => Err(CheckInError::Storage(format!(
                "Invalid registration status: {s}"
            ))),
        }
    }

    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Attended | Self::Cancelled | Self::NoShow)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an attendee was marked present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceMethod {
    /// Scanned QR content (identity-bearing or known code)
    QrScan,
    /// Scanned a bare code with a barcode reader
    BarcodeScan,
    /// Typed in by an operator
    Manual,
}

impl AttendanceMethod {
    /// Convert method to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QrScan => "qr_scan",
            Self::BarcodeScan => "barcode_scan",
            Self::Manual => "manual",
        }
    }

    /// Parse method from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known method.
    pub fn parse(s: &str) -> Result<Self, CheckInError> {
        match s {
            "qr_scan" => Ok(Self::QrScan),
            "barcode_scan" => Ok(Self::BarcodeScan),
            "manual" => Ok(Self::Manual),
            _ => Err(CheckInError::Storage(format!(
                "Invalid attendance method: {s}"
            ))),
        }
    }
}

impl fmt::Display for AttendanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Who a registration belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Holder {
    /// A known person.
    User {
        /// The attendee
        user_id: UserId,
    },
    /// Anonymous walk-in, attributed to the operator who created it.
    WalkIn {
        /// Operator that registered the walk-in
        attributed_to: OperatorId,
    },
}

impl Holder {
    /// The known user, if this is not a walk-in.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User { user_id } => Some(*user_id),
            Self::WalkIn { .. } => None,
        }
    }
}

/// A known person as reported by the identity directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderIdentity {
    /// User identifier
    pub user_id: UserId,
    /// Identity string carried in tokens (typically an email)
    pub email: String,
    /// Display name
    pub display_name: String,
    /// Secondary identifier (student number, badge id, ...)
    pub secondary_id: Option<String>,
}

/// One attendee's (or walk-in's) participation in one workshop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration identifier
    pub id: RegistrationId,
    /// Globally unique opaque code
    pub code: RegistrationCode,
    /// Owning workshop
    pub workshop_id: WorkshopId,
    /// Attendee or walk-in attribution
    pub holder: Holder,
    /// Lifecycle state
    pub status: RegistrationStatus,
    /// When the registration was created
    pub registered_at: DateTime<Utc>,
    /// When the registration was confirmed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When the attendee was marked present; set iff `status == Attended`
    pub attended_at: Option<DateTime<Utc>>,
    /// How the attendee was marked present
    pub attendance_method: Option<AttendanceMethod>,
    /// Operator responsible for the last state change
    pub marked_by: Option<OperatorId>,
    /// Free-form provenance note
    pub notes: Option<String>,
    /// Structured provenance data
    pub additional_data: serde_json::Value,
}

impl Registration {
    /// Whether the attendee has been marked present.
    #[must_use]
    pub fn is_attended(&self) -> bool {
        self.status == RegistrationStatus::Attended
    }
}

/// A registration about to be inserted.
///
/// The store assigns the identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRegistration {
    /// Pre-generated unique code
    pub code: RegistrationCode,
    /// Owning workshop
    pub workshop_id: WorkshopId,
    /// Attendee or walk-in attribution
    pub holder: Holder,
    /// Initial status (`Registered` or `Attended`)
    pub status: RegistrationStatus,
    /// Creation time
    pub registered_at: DateTime<Utc>,
    /// Set when created directly in `Attended`
    pub attended_at: Option<DateTime<Utc>>,
    /// Set when created directly in `Attended`
    pub attendance_method: Option<AttendanceMethod>,
    /// Acting operator, if any
    pub marked_by: Option<OperatorId>,
    /// Provenance note
    pub notes: Option<String>,
    /// Provenance data
    pub additional_data: serde_json::Value,
}

impl NewRegistration {
    /// Materialize the stored record once the store has assigned an id.
    #[must_use]
    pub fn into_registration(self, id: RegistrationId) -> Registration {
        Registration {
            id,
            code: self.code,
            workshop_id: self.workshop_id,
            holder: self.holder,
            status: self.status,
            registered_at: self.registered_at,
            confirmed_at: None,
            attended_at: self.attended_at,
            attendance_method: self.attendance_method,
            marked_by: self.marked_by,
            notes: self.notes,
            additional_data: self.additional_data,
        }
    }
}

/// Capacity-relevant projection of a workshop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workshop {
    /// Workshop identifier
    pub id: WorkshopId,
    /// Display title
    pub title: String,
    /// Attendee limit; `None` means unlimited
    pub max_attendees: Option<u32>,
    /// Live occupancy counter (write-through, not recomputed)
    pub current_attendees: u32,
    /// Whether the workshop is open at all
    pub is_active: bool,
    /// Whether sign-up is required / offered
    pub requires_registration: bool,
    /// Sign-up closes after this instant
    pub registration_deadline: Option<DateTime<Utc>>,
}

// ============================================================================
// Views
// ============================================================================

/// Caller-facing projection of a registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationView {
    /// Registration identifier
    pub registration_id: RegistrationId,
    /// Registration code
    pub code: RegistrationCode,
    /// Owning workshop
    pub workshop_id: WorkshopId,
    /// Workshop title
    pub workshop_title: String,
    /// Holder display name, if the holder is known
    pub holder_name: Option<String>,
    /// Holder identity string, if the holder is known
    pub holder_email: Option<String>,
    /// Current status
    pub status: RegistrationStatus,
    /// Check-in time
    pub attended_at: Option<DateTime<Utc>>,
    /// Check-in method
    pub attendance_method: Option<AttendanceMethod>,
}

impl RegistrationView {
    /// Build a view from a registration, its workshop and its (optional) holder.
    #[must_use]
    pub fn new(
        registration: &Registration,
        workshop: &Workshop,
        holder: Option<&HolderIdentity>,
    ) -> Self {
        Self {
            registration_id: registration.id,
            code: registration.code.clone(),
            workshop_id: registration.workshop_id,
            workshop_title: workshop.title.clone(),
            holder_name: holder.map(|h| h.display_name.clone()),
            holder_email: holder.map(|h| h.email.clone()),
            status: registration.status,
            attended_at: registration.attended_at,
            attendance_method: registration.attendance_method,
        }
    }
}

/// Result of a check-in attempt as reported to operators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckInResult {
    /// Whether this call marked someone present
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// The registration involved, when one was located or created
    pub registration_view: Option<RegistrationView>,
}

/// One registration listed in a participant search result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRegistration {
    /// Registration identifier
    pub registration_id: RegistrationId,
    /// Workshop
    pub workshop_id: WorkshopId,
    /// Workshop title
    pub workshop_title: String,
    /// Registration code
    pub code: RegistrationCode,
    /// Current status
    pub status: RegistrationStatus,
    /// Whether the participant attended
    pub attended: bool,
}

/// A person matching a participant search, with their registrations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantMatch {
    /// The matched person
    pub holder: HolderIdentity,
    /// Registrations across all workshops
    pub registrations: Vec<ParticipantRegistration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_normalized() {
        assert_eq!(RegistrationCode::new("  ab12cd ").as_str(), "AB12CD");
        assert_eq!(RegistrationCode::new("ab12cd"), RegistrationCode::new("AB12CD"));
    }

    #[test]
    fn code_shape() {
        assert!(RegistrationCode::new("AB12-CD34").is_code_shaped());
        assert!(!RegistrationCode::new("abc").is_code_shaped());
        assert!(!RegistrationCode::new("john smith").is_code_shaped());
        assert!(!RegistrationCode::new("a@b.com").is_code_shaped());
    }

    #[test]
    fn status_round_trips_through_database_strings() {
        for status in RegistrationStatus::ALL {
            assert_eq!(RegistrationStatus::parse(status.as_str()), Ok(status));
        }
        assert!(RegistrationStatus::parse("checked_in").is_err());
    }

    #[test]
    fn walk_in_has_no_user() {
        let holder = Holder::WalkIn {
            attributed_to: OperatorId::new(3),
        };
        assert_eq!(holder.user_id(), None);
        assert_eq!(
            Holder::User {
                user_id: UserId::new(9)
            }
            .user_id(),
            Some(UserId::new(9))
        );
    }
}
