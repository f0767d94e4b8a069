//! `PostgreSQL` registration store.
//!
//! A unit of work is one database transaction that starts by taking a row
//! lock on the workshop (`SELECT ... FOR UPDATE`). Every writer for the same
//! workshop queues behind that lock, so the "is there already a live
//! registration?" read and the insert that follows it cannot interleave with
//! another scan. The partial unique index on `(workshop_id, user_id)` and the
//! unique `code` column back this up at the schema level.

use std::fmt;

use checkin_core::capacity::{CapacityEffect, CapacityLedger};
use checkin_core::code::CodeRegistry;
use checkin_core::error::{CheckInError, Result};
use checkin_core::store::{CheckInStore, UnitOfWork};
use checkin_core::types::{
    NewRegistration, Registration, RegistrationCode, RegistrationId, RegistrationStatus, UserId,
    Workshop, WorkshopId,
};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::rows::{
    db_error, holder_columns, row_to_registration, row_to_workshop, select_registrations,
    select_workshops,
};

/// Registration store backed by a connection pool.
///
/// # Example
///
/// ```no_run
/// use checkin_core::store::CheckInStore;
/// use checkin_core::types::WorkshopId;
/// use checkin_postgres::PostgresCheckInStore;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresCheckInStore::new(pool);
/// let workshop = store.workshop(WorkshopId::new(7)).await?;
/// println!("{workshop:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PostgresCheckInStore {
    pool: PgPool,
}

impl PostgresCheckInStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CheckInStore for PostgresCheckInStore {
    type Unit = PostgresUnit;

    #[tracing::instrument(skip(self), name = "postgres_begin")]
    async fn begin(&self, workshop_id: WorkshopId) -> Result<PostgresUnit> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let row = sqlx::query(select_workshops!("WHERE id = $1 FOR UPDATE"))
            .bind(workshop_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to lock workshop"))?
            .ok_or(CheckInError::WorkshopNotFound(workshop_id))?;

        let workshop = row_to_workshop(&row)?;
        tracing::debug!(workshop_id = %workshop_id, "Workshop locked");

        Ok(PostgresUnit { tx, workshop })
    }

    async fn workshop(&self, workshop_id: WorkshopId) -> Result<Option<Workshop>> {
        sqlx::query(select_workshops!("WHERE id = $1"))
            .bind(workshop_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load workshop"))?
            .map(|row| row_to_workshop(&row))
            .transpose()
    }

    async fn registration(&self, id: RegistrationId) -> Result<Option<Registration>> {
        sqlx::query(select_registrations!("WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load registration"))?
            .map(|row| row_to_registration(&row))
            .transpose()
    }

    async fn registrations_for_users(&self, users: &[UserId]) -> Result<Vec<(Registration, String)>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = users.iter().map(|u| u.get()).collect();

        let rows = sqlx::query(
            "SELECT r.id, r.code, r.workshop_id, r.user_id, r.walk_in_operator_id, r.status, \
                    r.registered_at, r.confirmed_at, r.attended_at, r.attendance_method, \
                    r.marked_by, r.notes, r.additional_data, w.title AS workshop_title \
             FROM workshop_registrations r \
             JOIN workshops w ON w.id = r.workshop_id \
             WHERE r.user_id = ANY($1) \
             ORDER BY r.id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load participant registrations"))?;

        rows.iter()
            .map(|row| -> Result<(Registration, String)> {
                let title: String = row.try_get("workshop_title").map_err(|e| {
                    CheckInError::Storage(format!("Failed to decode workshop title: {e}"))
                })?;
                Ok((row_to_registration(row)?, title))
            })
            .collect()
    }
}

/// One transaction holding the lock on one workshop row.
///
/// Dropping it without calling [`UnitOfWork::commit`] rolls the transaction
/// back.
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
    workshop: Workshop,
}

impl fmt::Debug for PostgresUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresUnit")
            .field("workshop", &self.workshop)
            .finish_non_exhaustive()
    }
}

impl CodeRegistry for PostgresUnit {
    async fn code_exists(&mut self, code: &RegistrationCode) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM workshop_registrations WHERE code = $1)")
            .bind(code.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("Failed to check code"))?;

        row.try_get::<bool, _>(0)
            .map_err(|e| CheckInError::Storage(format!("Failed to decode code check: {e}")))
    }
}

impl UnitOfWork for PostgresUnit {
    fn workshop(&self) -> &Workshop {
        &self.workshop
    }

    async fn find_by_id(&mut self, id: RegistrationId) -> Result<Option<Registration>> {
        sqlx::query(select_registrations!("WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("Failed to load registration"))?
            .map(|row| row_to_registration(&row))
            .transpose()
    }

    async fn find_by_code(&mut self, code: &RegistrationCode) -> Result<Option<Registration>> {
        sqlx::query(select_registrations!("WHERE code = $1"))
            .bind(code.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("Failed to load registration by code"))?
            .map(|row| row_to_registration(&row))
            .transpose()
    }

    async fn find_live_by_user(&mut self, user_id: UserId) -> Result<Option<Registration>> {
        sqlx::query(select_registrations!(
            "WHERE workshop_id = $1 AND user_id = $2 AND status <> 'cancelled' \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(self.workshop.id.get())
        .bind(user_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to load live registration"))?
        .map(|row| row_to_registration(&row))
        .transpose()
    }

    async fn insert(&mut self, registration: NewRegistration) -> Result<Registration> {
        let (user_id, walk_in_operator_id) = holder_columns(registration.holder);

        let row = sqlx::query(
            "INSERT INTO workshop_registrations \
                (code, workshop_id, user_id, walk_in_operator_id, status, registered_at, \
                 attended_at, attendance_method, marked_by, notes, additional_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING id",
        )
        .bind(registration.code.as_str())
        .bind(registration.workshop_id.get())
        .bind(user_id)
        .bind(walk_in_operator_id)
        .bind(registration.status.as_str())
        .bind(registration.registered_at)
        .bind(registration.attended_at)
        .bind(registration.attendance_method.map(|m| m.as_str()))
        .bind(registration.marked_by.map(|o| o.get()))
        .bind(registration.notes.as_deref())
        .bind(&registration.additional_data)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert registration"))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| CheckInError::Storage(format!("Failed to decode new id: {e}")))?;

        tracing::debug!(registration_id = id, code = %registration.code, "Registration inserted");
        Ok(registration.into_registration(RegistrationId::new(id)))
    }

    async fn update_if(
        &mut self,
        registration: &Registration,
        expected: &[RegistrationStatus],
    ) -> Result<bool> {
        let expected: Vec<&'static str> = expected.iter().map(RegistrationStatus::as_str).collect();

        let result = sqlx::query(
            "UPDATE workshop_registrations \
             SET status = $2, confirmed_at = $3, attended_at = $4, attendance_method = $5, \
                 marked_by = $6, notes = $7, additional_data = $8 \
             WHERE id = $1 AND status = ANY($9)",
        )
        .bind(registration.id.get())
        .bind(registration.status.as_str())
        .bind(registration.confirmed_at)
        .bind(registration.attended_at)
        .bind(registration.attendance_method.map(|m| m.as_str()))
        .bind(registration.marked_by.map(|o| o.get()))
        .bind(registration.notes.as_deref())
        .bind(&registration.additional_data)
        .bind(expected)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to update registration"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_capacity(&mut self, effect: CapacityEffect) -> Result<()> {
        if effect == CapacityEffect::None {
            return Ok(());
        }

        let mut updated = self.workshop.clone();
        CapacityLedger::apply(&mut updated, effect);
        let current = i32::try_from(updated.current_attendees).map_err(|_| {
            CheckInError::Storage(format!(
                "Attendee counter out of range: {}",
                updated.current_attendees
            ))
        })?;

        sqlx::query("UPDATE workshops SET current_attendees = $2 WHERE id = $1")
            .bind(updated.id.get())
            .bind(current)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("Failed to update attendee counter"))?;

        self.workshop = updated;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(db_error("Failed to commit transaction"))
    }
}
