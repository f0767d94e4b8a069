//! In-memory registration store.
//!
//! A unit of work holds the store-wide async lock for its whole lifetime and
//! writes to a staged copy of the state. `commit` swaps the staged copy in;
//! dropping the unit discards it. This gives the same all-or-nothing and
//! serialization guarantees as the postgres store, with one global lock
//! instead of a per-workshop row lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use checkin_core::capacity::{CapacityEffect, CapacityLedger};
use checkin_core::code::CodeRegistry;
use checkin_core::error::{CheckInError, Result};
use checkin_core::store::{CheckInStore, UnitOfWork};
use checkin_core::types::{
    NewRegistration, Registration, RegistrationCode, RegistrationId, RegistrationStatus, UserId,
    Workshop, WorkshopId,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Operation at which an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Starting a unit of work
    Begin,
    /// Inserting a registration
    Insert,
    /// Conditional registration update
    Update,
    /// Counter update
    ApplyCapacity,
    /// Commit
    Commit,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    workshops: BTreeMap<WorkshopId, Workshop>,
    registrations: BTreeMap<RegistrationId, Registration>,
    next_id: i64,
}

impl StoreState {
    fn insert(&mut self, new: NewRegistration) -> Result<Registration> {
        if self.registrations.values().any(|r| r.code == new.code) {
            return Err(CheckInError::Conflict(format!("code {} already exists", new.code)));
        }
        if let Some(user_id) = new.holder.user_id() {
            let duplicate = self.registrations.values().any(|r| {
                r.workshop_id == new.workshop_id
                    && r.holder.user_id() == Some(user_id)
                    && r.status != RegistrationStatus::Cancelled
            });
            if duplicate {
                return Err(CheckInError::Conflict(format!(
                    "user {user_id} already registered for workshop {}",
                    new.workshop_id
                )));
            }
        }

        self.next_id += 1;
        let registration = new.into_registration(RegistrationId::new(self.next_id));
        self.registrations.insert(registration.id, registration.clone());
        Ok(registration)
    }
}

/// Transactional in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<AsyncMutex<StoreState>>,
    failures: Arc<Mutex<Vec<FailurePoint>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a workshop.
    pub async fn add_workshop(&self, workshop: Workshop) {
        self.state.lock().await.workshops.insert(workshop.id, workshop);
    }

    /// Insert a registration directly, without touching the counter.
    ///
    /// # Panics
    ///
    /// Panics if the registration violates a uniqueness rule; fixtures are
    /// expected to be consistent.
    #[allow(clippy::expect_used)]
    pub async fn seed_registration(&self, registration: NewRegistration) -> Registration {
        self.state
            .lock()
            .await
            .insert(registration)
            .expect("seeded registration must be unique")
    }

    /// Current committed state of a workshop.
    pub async fn workshop_snapshot(&self, id: WorkshopId) -> Option<Workshop> {
        self.state.lock().await.workshops.get(&id).cloned()
    }

    /// All committed registrations, ordered by id.
    pub async fn registrations(&self) -> Vec<Registration> {
        self.state.lock().await.registrations.values().cloned().collect()
    }

    /// Make the next operation of the given kind fail with a storage error.
    pub fn fail_next(&self, point: FailurePoint) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(point);
    }

    fn injected(failures: &Mutex<Vec<FailurePoint>>, point: FailurePoint) -> Result<()> {
        let mut pending = failures.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.iter().position(|p| *p == point) {
            Some(index) => {
                pending.remove(index);
                Err(CheckInError::Storage(format!("injected failure at {point:?}")))
            }
            None => Ok(()),
        }
    }
}

impl CheckInStore for InMemoryStore {
    type Unit = InMemoryUnit;

    async fn begin(&self, workshop_id: WorkshopId) -> Result<InMemoryUnit> {
        Self::injected(&self.failures, FailurePoint::Begin)?;

        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = (*guard).clone();
        let workshop = staged
            .workshops
            .get(&workshop_id)
            .cloned()
            .ok_or(CheckInError::WorkshopNotFound(workshop_id))?;

        Ok(InMemoryUnit {
            guard,
            staged,
            workshop,
            failures: Arc::clone(&self.failures),
        })
    }

    async fn workshop(&self, workshop_id: WorkshopId) -> Result<Option<Workshop>> {
        Ok(self.workshop_snapshot(workshop_id).await)
    }

    async fn registration(&self, id: RegistrationId) -> Result<Option<Registration>> {
        Ok(self.state.lock().await.registrations.get(&id).cloned())
    }

    async fn registrations_for_users(&self, users: &[UserId]) -> Result<Vec<(Registration, String)>> {
        let state = self.state.lock().await;
        Ok(state
            .registrations
            .values()
            .filter(|r| r.holder.user_id().is_some_and(|u| users.contains(&u)))
            .map(|r| {
                let title = state
                    .workshops
                    .get(&r.workshop_id)
                    .map(|w| w.title.clone())
                    .unwrap_or_default();
                (r.clone(), title)
            })
            .collect())
    }
}

/// Unit of work over [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemoryUnit {
    guard: OwnedMutexGuard<StoreState>,
    staged: StoreState,
    workshop: Workshop,
    failures: Arc<Mutex<Vec<FailurePoint>>>,
}

impl CodeRegistry for InMemoryUnit {
    async fn code_exists(&mut self, code: &RegistrationCode) -> Result<bool> {
        Ok(self.staged.registrations.values().any(|r| &r.code == code))
    }
}

impl UnitOfWork for InMemoryUnit {
    fn workshop(&self) -> &Workshop {
        &self.workshop
    }

    async fn find_by_id(&mut self, id: RegistrationId) -> Result<Option<Registration>> {
        Ok(self.staged.registrations.get(&id).cloned())
    }

    async fn find_by_code(&mut self, code: &RegistrationCode) -> Result<Option<Registration>> {
        Ok(self
            .staged
            .registrations
            .values()
            .find(|r| &r.code == code)
            .cloned())
    }

    async fn find_live_by_user(&mut self, user_id: UserId) -> Result<Option<Registration>> {
        let workshop_id = self.workshop.id;
        Ok(self
            .staged
            .registrations
            .values()
            .rev()
            .find(|r| {
                r.workshop_id == workshop_id
                    && r.holder.user_id() == Some(user_id)
                    && r.status != RegistrationStatus::Cancelled
            })
            .cloned())
    }

    async fn insert(&mut self, registration: NewRegistration) -> Result<Registration> {
        InMemoryStore::injected(&self.failures, FailurePoint::Insert)?;
        self.staged.insert(registration)
    }

    async fn update_if(
        &mut self,
        registration: &Registration,
        expected: &[RegistrationStatus],
    ) -> Result<bool> {
        InMemoryStore::injected(&self.failures, FailurePoint::Update)?;
        match self.staged.registrations.get_mut(&registration.id) {
            Some(stored) if expected.contains(&stored.status) => {
                *stored = registration.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_capacity(&mut self, effect: CapacityEffect) -> Result<()> {
        InMemoryStore::injected(&self.failures, FailurePoint::ApplyCapacity)?;
        CapacityLedger::apply(&mut self.workshop, effect);
        self.staged
            .workshops
            .insert(self.workshop.id, self.workshop.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        InMemoryStore::injected(&self.failures, FailurePoint::Commit)?;
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{fixtures, test_epoch};
    use checkin_core::lifecycle;

    async fn store_with_workshop() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_workshop(fixtures::workshop(1, Some(10))).await;
        store
    }

    fn sign_up(user: i64, code: &str) -> NewRegistration {
        lifecycle::sign_up(
            WorkshopId::new(1),
            UserId::new(user),
            RegistrationCode::new(code),
            test_epoch(),
        )
    }

    #[tokio::test]
    async fn dropped_unit_rolls_back() {
        let store = store_with_workshop().await;
        {
            let mut unit = store.begin(WorkshopId::new(1)).await.unwrap();
            unit.insert(sign_up(1, "AAAA2222")).await.unwrap();
            unit.apply_capacity(CapacityEffect::Consume).await.unwrap();
        }
        assert!(store.registrations().await.is_empty());
        assert_eq!(store.workshop_snapshot(WorkshopId::new(1)).await.unwrap().current_attendees, 0);
    }

    #[tokio::test]
    async fn commit_publishes_registration_and_counter_together() {
        let store = store_with_workshop().await;
        let mut unit = store.begin(WorkshopId::new(1)).await.unwrap();
        unit.insert(sign_up(1, "AAAA2222")).await.unwrap();
        unit.apply_capacity(CapacityEffect::Consume).await.unwrap();
        unit.commit().await.unwrap();

        assert_eq!(store.registrations().await.len(), 1);
        assert_eq!(store.workshop_snapshot(WorkshopId::new(1)).await.unwrap().current_attendees, 1);
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = store_with_workshop().await;
        store.fail_next(FailurePoint::Commit);
        let mut unit = store.begin(WorkshopId::new(1)).await.unwrap();
        unit.insert(sign_up(1, "AAAA2222")).await.unwrap();
        assert!(unit.commit().await.is_err());
        assert!(store.registrations().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_code_is_a_conflict() {
        let store = store_with_workshop().await;
        store.seed_registration(sign_up(1, "AAAA2222")).await;
        let mut unit = store.begin(WorkshopId::new(1)).await.unwrap();
        assert!(unit.code_exists(&RegistrationCode::new("aaaa2222")).await.unwrap());
        assert!(matches!(
            unit.insert(sign_up(2, "AAAA2222")).await,
            Err(CheckInError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_if_respects_guard() {
        let store = store_with_workshop().await;
        let mut registration = store.seed_registration(sign_up(1, "AAAA2222")).await;
        registration.status = RegistrationStatus::Attended;
        registration.attended_at = Some(test_epoch());

        let mut unit = store.begin(WorkshopId::new(1)).await.unwrap();
        assert!(!unit.update_if(&registration, &[RegistrationStatus::Confirmed]).await.unwrap());
        assert!(unit.update_if(&registration, &[RegistrationStatus::Registered]).await.unwrap());
        assert!(!unit.update_if(&registration, &[RegistrationStatus::Registered]).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_workshop_cannot_begin() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.begin(WorkshopId::new(9)).await.err(),
            Some(CheckInError::WorkshopNotFound(WorkshopId::new(9)))
        );
    }
}
