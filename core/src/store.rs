//! Storage and identity seams.
//!
//! The runtime only talks to storage through these traits. Every mutation
//! happens inside a [`UnitOfWork`] obtained from [`CheckInStore::begin`]:
//!
//! - `begin` locks the workshop, so all writers for one workshop are
//!   serialized and "does a registration already exist?" checks are part of
//!   the same atomic unit as the insert that follows them.
//! - [`UnitOfWork::update_if`] is a conditional write ("set ... where id = X
//!   and status in (...)") so a lost race is observed, never overwritten.
//! - [`UnitOfWork::apply_capacity`] changes the counter in the same
//!   transaction as the registration write that caused it.
//! - Nothing is visible until [`UnitOfWork::commit`]. Dropping a unit of
//!   work without committing rolls it back.
//!
//! Implementations: `checkin_postgres::PostgresCheckInStore` and
//! `checkin_testing::InMemoryStore`.

use std::future::Future;

use crate::capacity::CapacityEffect;
use crate::code::CodeRegistry;
use crate::error::Result;
use crate::types::{
    HolderIdentity, NewRegistration, Registration, RegistrationCode, RegistrationId,
    RegistrationStatus, UserId, Workshop, WorkshopId,
};

/// Lookup of known people. Owned by the surrounding application.
pub trait IdentityDirectory: Send + Sync {
    /// Resolve an identity string (email, case-insensitive) to a person.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn find_by_identity(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<Option<HolderIdentity>>> + Send;

    /// Fetch a person by id.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn find_by_id(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<HolderIdentity>>> + Send;

    /// Case-insensitive substring match on display name, identity and
    /// secondary identifier.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HolderIdentity>>> + Send;
}

/// Registration store with transactional units of work.
pub trait CheckInStore: Send + Sync {
    /// Unit of work type.
    type Unit: UnitOfWork;

    /// Start a unit of work scoped to (and locking) one workshop.
    ///
    /// # Errors
    ///
    /// - `CheckInError::WorkshopNotFound` if the workshop does not exist
    /// - `CheckInError::Storage` if the transaction cannot start
    fn begin(&self, workshop_id: WorkshopId) -> impl Future<Output = Result<Self::Unit>> + Send;

    /// Read a workshop outside any unit of work.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn workshop(
        &self,
        workshop_id: WorkshopId,
    ) -> impl Future<Output = Result<Option<Workshop>>> + Send;

    /// Read a registration outside any unit of work.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn registration(
        &self,
        id: RegistrationId,
    ) -> impl Future<Output = Result<Option<Registration>>> + Send;

    /// All registrations held by the given people, with workshop titles.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn registrations_for_users(
        &self,
        users: &[UserId],
    ) -> impl Future<Output = Result<Vec<(Registration, String)>>> + Send;
}

/// One atomic unit of work over a locked workshop.
pub trait UnitOfWork: CodeRegistry {
    /// The locked workshop, including counter changes made in this unit.
    fn workshop(&self) -> &Workshop;

    /// Find a registration by id, in any workshop.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn find_by_id(
        &mut self,
        id: RegistrationId,
    ) -> impl Future<Output = Result<Option<Registration>>> + Send;

    /// Find a registration by code, in any workshop.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn find_by_code(
        &mut self,
        code: &RegistrationCode,
    ) -> impl Future<Output = Result<Option<Registration>>> + Send;

    /// The newest non-cancelled registration of `user_id` in the locked
    /// workshop.
    ///
    /// # Errors
    ///
    /// Returns error if the lookup fails.
    fn find_live_by_user(
        &mut self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<Registration>>> + Send;

    /// Insert a registration. The store assigns the id.
    ///
    /// # Errors
    ///
    /// - `CheckInError::Conflict` on a uniqueness violation
    /// - `CheckInError::Storage` on any other failure
    fn insert(
        &mut self,
        registration: NewRegistration,
    ) -> impl Future<Output = Result<Registration>> + Send;

    /// Overwrite the mutable fields of `registration` if its stored status
    /// is still one of `expected`. Returns `false` when the guard failed.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn update_if(
        &mut self,
        registration: &Registration,
        expected: &[RegistrationStatus],
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Apply a counter effect to the locked workshop.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn apply_capacity(&mut self, effect: CapacityEffect) -> impl Future<Output = Result<()>> + Send;

    /// Make every change of this unit visible atomically.
    ///
    /// # Errors
    ///
    /// Returns `CheckInError::Storage` if the commit fails; nothing is
    /// applied in that case.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}
