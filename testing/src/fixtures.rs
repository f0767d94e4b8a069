//! Builders for common test data.

use checkin_core::types::{HolderIdentity, OperatorId, UserId, Workshop, WorkshopId};

/// An active workshop open for registration, with an empty counter.
#[must_use]
pub fn workshop(id: i64, max_attendees: Option<u32>) -> Workshop {
    Workshop {
        id: WorkshopId::new(id),
        title: format!("Workshop {id}"),
        max_attendees,
        current_attendees: 0,
        is_active: true,
        requires_registration: true,
        registration_deadline: None,
    }
}

/// A workshop whose counter already reads `current`.
#[must_use]
pub fn workshop_with_occupancy(id: i64, max_attendees: Option<u32>, current: u32) -> Workshop {
    Workshop {
        current_attendees: current,
        ..workshop(id, max_attendees)
    }
}

/// A known person.
#[must_use]
pub fn person(id: i64, email: &str, display_name: &str) -> HolderIdentity {
    HolderIdentity {
        user_id: UserId::new(id),
        email: email.to_string(),
        display_name: display_name.to_string(),
        secondary_id: None,
    }
}

/// The staff operator used across tests.
#[must_use]
pub const fn operator() -> OperatorId {
    OperatorId::new(900)
}
