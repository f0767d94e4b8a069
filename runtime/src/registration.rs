//! Self-service sign-up, explicit lifecycle commands and QR content issuance.

use checkin_core::capacity::{CapacityEffect, CapacityLedger};
use checkin_core::error::{CheckInError, Result};
use checkin_core::lifecycle::{self, Transition};
use checkin_core::store::{CheckInStore, IdentityDirectory, UnitOfWork};
use checkin_core::token;
use checkin_core::types::{Holder, OperatorId, Registration, RegistrationId, UserId, WorkshopId};
use tracing::info;

use crate::CheckInService;
use crate::metrics::{REGISTRATIONS_CREATED_TOTAL, TRANSITIONS_TOTAL};
use crate::retry::retry_storage;

impl<S, D> CheckInService<S, D>
where
    S: CheckInStore,
    D: IdentityDirectory,
{
    /// Sign a known person up for a workshop.
    ///
    /// Creates a `registered` registration with a fresh code and consumes one
    /// capacity slot, in one unit of work.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::UnknownHolder`] if the person is not in the directory
    /// - [`CheckInError::WorkshopNotFound`] if the workshop does not exist
    /// - [`CheckInError::RegistrationClosed`] or
    ///   [`CheckInError::CapacityExceeded`] if sign-up is not possible
    /// - [`CheckInError::AlreadyRegistered`] if the person holds a live
    ///   registration for the workshop
    /// - Storage errors once retries are exhausted
    #[tracing::instrument(skip(self), name = "register")]
    pub async fn register(&self, workshop_id: WorkshopId, user_id: UserId) -> Result<Registration> {
        if self.directory.find_by_id(user_id).await?.is_none() {
            return Err(CheckInError::UnknownHolder {
                identity: format!("user {user_id}"),
            });
        }

        let registration = retry_storage(&self.config.retry, "register", || async move {
            let now = self.clock.now();
            let mut unit = self.store.begin(workshop_id).await?;
            CapacityLedger::check_sign_up(unit.workshop(), now)?;

            if let Some(existing) = unit.find_live_by_user(user_id).await? {
                return Err(CheckInError::AlreadyRegistered {
                    existing: existing.id,
                });
            }

            let code = self.config.codes.generate_unique(&mut unit).await?;
            let registration = unit
                .insert(lifecycle::sign_up(workshop_id, user_id, code, now))
                .await?;
            unit.apply_capacity(CapacityLedger::on_registration_created())
                .await?;
            unit.commit().await?;
            Ok(registration)
        })
        .await?;

        info!(
            registration_id = %registration.id,
            code = %registration.code,
            "Registration created"
        );
        metrics::counter!(REGISTRATIONS_CREATED_TOTAL, "path" => "sign_up").increment(1);
        Ok(registration)
    }

    /// `registered → confirmed`.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::UnknownRegistration`] if the registration does not exist
    /// - [`CheckInError::InvalidTransition`] unless it is `registered`
    pub async fn confirm(&self, registration_id: RegistrationId, by: Option<OperatorId>) -> Result<Registration> {
        let at = self.clock.now();
        self.transition(registration_id, Transition::Confirm { at, by })
            .await
    }

    /// Cancel a registration and release its capacity slot.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::UnknownRegistration`] if the registration does not exist
    /// - [`CheckInError::InvalidTransition`] if it is attended, cancelled or
    ///   a no-show
    pub async fn cancel(&self, registration_id: RegistrationId, by: Option<OperatorId>) -> Result<Registration> {
        self.transition(registration_id, Transition::Cancel { by })
            .await
    }

    /// Record a no-show. The capacity slot stays taken.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::UnknownRegistration`] if the registration does not exist
    /// - [`CheckInError::InvalidTransition`] if it is attended, cancelled or
    ///   already a no-show
    pub async fn mark_no_show(&self, registration_id: RegistrationId, by: OperatorId) -> Result<Registration> {
        self.transition(registration_id, Transition::MarkNoShow { by })
            .await
    }

    /// Scannable content for a registration.
    ///
    /// Known holders get a field-composed token carrying their identity and
    /// the registration reference; walk-ins (and holders the directory no
    /// longer knows) get the legacy format carrying the code.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::UnknownRegistration`] if the registration does not exist
    /// - Lookup errors from the store or directory
    pub async fn qr_content(&self, registration_id: RegistrationId) -> Result<String> {
        let registration = self
            .store
            .registration(registration_id)
            .await?
            .ok_or(CheckInError::UnknownRegistration(registration_id))?;

        let holder = match registration.holder {
            Holder::User { user_id } => self.directory.find_by_id(user_id).await?,
            Holder::WalkIn { .. } => None,
        };

        Ok(match holder {
            Some(person) => token::encode_field_composed(
                registration.workshop_id,
                &person.email,
                self.clock.now(),
                Some(registration.id),
            ),
            None => token::encode_legacy(registration.workshop_id, registration.id, &registration.code),
        })
    }

    #[tracing::instrument(skip(self, transition), name = "transition", fields(to = %transition.target()))]
    async fn transition(&self, registration_id: RegistrationId, transition: Transition) -> Result<Registration> {
        let workshop_id = self
            .store
            .registration(registration_id)
            .await?
            .ok_or(CheckInError::UnknownRegistration(registration_id))?
            .workshop_id;

        let updated = retry_storage(&self.config.retry, "transition", || async move {
            let mut unit = self.store.begin(workshop_id).await?;
            let current = unit
                .find_by_id(registration_id)
                .await?
                .ok_or(CheckInError::UnknownRegistration(registration_id))?;

            let mut updated = current.clone();
            let effect = lifecycle::apply(&mut updated, transition)?;
            if !unit.update_if(&updated, transition.allowed_from()).await? {
                let stored = unit
                    .find_by_id(registration_id)
                    .await?
                    .map_or(current.status, |r| r.status);
                return Err(CheckInError::InvalidTransition {
                    from: stored,
                    to: transition.target(),
                });
            }
            if effect != CapacityEffect::None {
                unit.apply_capacity(effect).await?;
            }
            unit.commit().await?;
            Ok(updated)
        })
        .await?;

        info!(
            registration_id = %updated.id,
            status = %updated.status,
            "Registration updated"
        );
        metrics::counter!(TRANSITIONS_TOTAL, "status" => updated.status.as_str()).increment(1);
        Ok(updated)
    }
}
