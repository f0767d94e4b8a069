//! Shared fixtures for runtime integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use checkin_core::lifecycle;
use checkin_core::types::{Registration, RegistrationCode, UserId, Workshop, WorkshopId};
use checkin_runtime::{CheckInService, RetryPolicy, ServiceConfig};
use checkin_testing::{InMemoryDirectory, InMemoryStore, ManualClock, fixtures, test_epoch};

pub type Service = CheckInService<InMemoryStore, InMemoryDirectory>;

/// Workshop most tests check people into.
pub const W: WorkshopId = WorkshopId::new(7);

/// A second workshop, for cross-workshop cases.
pub const OTHER: WorkshopId = WorkshopId::new(8);

pub struct Harness {
    pub service: Arc<Service>,
    pub store: InMemoryStore,
    pub directory: InMemoryDirectory,
    pub clock: ManualClock,
}

impl Harness {
    pub async fn new(workshop: Workshop) -> Self {
        Self::with_config(workshop, fast_config()).await
    }

    pub async fn with_config(workshop: Workshop, config: ServiceConfig) -> Self {
        checkin_testing::helpers::init_tracing();

        let store = InMemoryStore::new();
        store.add_workshop(workshop).await;
        store
            .add_workshop(fixtures::workshop(OTHER.get(), None))
            .await;

        let directory = InMemoryDirectory::with_people([
            fixtures::person(1, "a@b.com", "Ada Lovelace"),
            fixtures::person(2, "grace@navy.mil", "Grace Hopper"),
        ]);
        let clock = ManualClock::new(test_epoch());

        let service = CheckInService::with_config(
            store.clone(),
            directory.clone(),
            Arc::new(clock.clone()),
            config,
        );

        Self {
            service: Arc::new(service),
            store,
            directory,
            clock,
        }
    }

    /// Insert a `registered` registration directly (counter untouched).
    pub async fn seed(&self, workshop: WorkshopId, user: i64, code: &str) -> Registration {
        self.store
            .seed_registration(lifecycle::sign_up(
                workshop,
                UserId::new(user),
                RegistrationCode::new(code),
                test_epoch(),
            ))
            .await
    }

    pub async fn occupancy(&self, workshop: WorkshopId) -> u32 {
        self.store
            .workshop_snapshot(workshop)
            .await
            .map_or(0, |w| w.current_attendees)
    }
}

/// Default config with near-zero retry delays.
pub fn fast_config() -> ServiceConfig {
    ServiceConfig::default().with_retry_policy(
        RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .build(),
    )
}
