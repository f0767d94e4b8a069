//! Row decoding and error mapping.

use checkin_core::error::CheckInError;
use checkin_core::types::{
    AttendanceMethod, Holder, HolderIdentity, OperatorId, Registration, RegistrationCode,
    RegistrationId, RegistrationStatus, UserId, Workshop, WorkshopId,
};
use sqlx::postgres::PgRow;
use sqlx::{Decode, Postgres, Row, Type};

/// Columns selected for every registration read.
macro_rules! select_registrations {
    ($tail:literal) => {
        concat!(
            "SELECT id, code, workshop_id, user_id, walk_in_operator_id, status, ",
            "registered_at, confirmed_at, attended_at, attendance_method, marked_by, ",
            "notes, additional_data FROM workshop_registrations ",
            $tail
        )
    };
}
pub(crate) use select_registrations;

/// Columns selected for every workshop read.
macro_rules! select_workshops {
    ($tail:literal) => {
        concat!(
            "SELECT id, title, max_attendees, current_attendees, is_active, ",
            "requires_registration, registration_deadline FROM workshops ",
            $tail
        )
    };
}
pub(crate) use select_workshops;

/// Map a sqlx error to the check-in taxonomy.
///
/// Unique violations, serialization failures and deadlocks become
/// [`CheckInError::Conflict`] so the runtime retries them; everything else
/// is [`CheckInError::Storage`].
pub(crate) fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> CheckInError {
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            let transient = matches!(db_err.code().as_deref(), Some("40001" | "40P01"));
            if db_err.is_unique_violation() || transient {
                metrics::counter!("checkin_postgres_conflicts_total", "context" => context)
                    .increment(1);
                return CheckInError::Conflict(format!("{context}: {}", db_err.message()));
            }
        }
        CheckInError::Storage(format!("{context}: {e}"))
    }
}

fn column<'r, T>(row: &'r PgRow, name: &'static str) -> Result<T, CheckInError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| CheckInError::Storage(format!("Failed to decode column {name}: {e}")))
}

fn counter(value: i32, name: &'static str) -> Result<u32, CheckInError> {
    u32::try_from(value)
        .map_err(|_| CheckInError::Storage(format!("Column {name} is negative: {value}")))
}

pub(crate) fn row_to_workshop(row: &PgRow) -> Result<Workshop, CheckInError> {
    let max_attendees: Option<i32> = column(row, "max_attendees")?;

    Ok(Workshop {
        id: WorkshopId::new(column(row, "id")?),
        title: column(row, "title")?,
        max_attendees: max_attendees
            .map(|max| counter(max, "max_attendees"))
            .transpose()?,
        current_attendees: counter(column(row, "current_attendees")?, "current_attendees")?,
        is_active: column(row, "is_active")?,
        requires_registration: column(row, "requires_registration")?,
        registration_deadline: column(row, "registration_deadline")?,
    })
}

pub(crate) fn row_to_registration(row: &PgRow) -> Result<Registration, CheckInError> {
    let id = RegistrationId::new(column(row, "id")?);

    let user_id: Option<i64> = column(row, "user_id")?;
    let walk_in_operator_id: Option<i64> = column(row, "walk_in_operator_id")?;
    let holder = match (user_id, walk_in_operator_id) {
        (Some(user_id), _) => Holder::User {
            user_id: UserId::new(user_id),
        },
        (None, Some(operator)) => Holder::WalkIn {
            attributed_to: OperatorId::new(operator),
        },
        (None, None) => {
            return Err(CheckInError::Storage(format!(
                "Registration {id} has no holder"
            )));
        }
    };

    let status: String = column(row, "status")?;
    let method: Option<String> = column(row, "attendance_method")?;
    let code: String = column(row, "code")?;
    let marked_by: Option<i64> = column(row, "marked_by")?;

    Ok(Registration {
        id,
        code: RegistrationCode::new(&code),
        workshop_id: WorkshopId::new(column(row, "workshop_id")?),
        holder,
        status: RegistrationStatus::parse(&status)?,
        registered_at: column(row, "registered_at")?,
        confirmed_at: column(row, "confirmed_at")?,
        attended_at: column(row, "attended_at")?,
        attendance_method: method.as_deref().map(AttendanceMethod::parse).transpose()?,
        marked_by: marked_by.map(OperatorId::new),
        notes: column(row, "notes")?,
        additional_data: column(row, "additional_data")?,
    })
}

pub(crate) fn row_to_identity(row: &PgRow) -> Result<HolderIdentity, CheckInError> {
    Ok(HolderIdentity {
        user_id: UserId::new(column(row, "id")?),
        email: column(row, "email")?,
        display_name: column(row, "display_name")?,
        secondary_id: column(row, "secondary_id")?,
    })
}

/// Split a holder into its two storage columns.
pub(crate) const fn holder_columns(holder: Holder) -> (Option<i64>, Option<i64>) {
    match holder {
        Holder::User { user_id } => (Some(user_id.get()), None),
        Holder::WalkIn { attributed_to } => (None, Some(attributed_to.get())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holder_maps_to_exactly_one_column() {
        assert_eq!(
            holder_columns(Holder::User { user_id: UserId::new(4) }),
            (Some(4), None)
        );
        assert_eq!(
            holder_columns(Holder::WalkIn { attributed_to: OperatorId::new(9) }),
            (None, Some(9))
        );
    }

    #[test]
    fn non_database_errors_are_storage_errors() {
        let err = db_error("load workshop")(sqlx::Error::RowNotFound);
        assert!(matches!(err, CheckInError::Storage(ref m) if m.starts_with("load workshop")));
        assert!(err.is_retryable());
    }

    #[test]
    fn select_macros_build_full_queries() {
        let sql = select_registrations!("WHERE id = $1");
        assert!(sql.starts_with("SELECT id, code,"));
        assert!(sql.ends_with("FROM workshop_registrations WHERE id = $1"));
        assert!(select_workshops!("WHERE id = $1 FOR UPDATE").contains("current_attendees"));
    }
}
