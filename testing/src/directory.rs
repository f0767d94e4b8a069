//! In-memory identity directory.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use checkin_core::error::Result;
use checkin_core::store::IdentityDirectory;
use checkin_core::types::{HolderIdentity, UserId};

/// Identity directory backed by a list of people.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    people: Arc<RwLock<Vec<HolderIdentity>>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory holding `people`.
    #[must_use]
    pub fn with_people(people: impl IntoIterator<Item = HolderIdentity>) -> Self {
        Self {
            people: Arc::new(RwLock::new(people.into_iter().collect())),
        }
    }

    /// Add a person.
    pub fn add(&self, person: HolderIdentity) {
        self.people
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(person);
    }
}

impl IdentityDirectory for InMemoryDirectory {
    fn find_by_identity(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<Option<HolderIdentity>>> + Send {
        let people = Arc::clone(&self.people);
        let identity = identity.trim().to_string();

        async move {
            let people = people.read().unwrap_or_else(PoisonError::into_inner);
            Ok(people
                .iter()
                .find(|p| p.email.eq_ignore_ascii_case(&identity))
                .cloned())
        }
    }

    fn find_by_id(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<HolderIdentity>>> + Send {
        let people = Arc::clone(&self.people);

        async move {
            let people = people.read().unwrap_or_else(PoisonError::into_inner);
            Ok(people.iter().find(|p| p.user_id == user_id).cloned())
        }
    }

    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HolderIdentity>>> + Send {
        let people = Arc::clone(&self.people);
        let needle = query.trim().to_lowercase();

        async move {
            let people = people.read().unwrap_or_else(PoisonError::into_inner);
            Ok(people
                .iter()
                .filter(|p| {
                    p.display_name.to_lowercase().contains(&needle)
                        || p.email.to_lowercase().contains(&needle)
                        || p
                            .secondary_id
                            .as_ref()
                            .is_some_and(|s| s.to_lowercase().contains(&needle))
                })
                .take(limit)
                .cloned()
                .collect())
        }
    }
}
