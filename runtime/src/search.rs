//! Participant Search: read-only lookup of people and their registrations.

use std::collections::HashMap;

use checkin_core::error::Result;
use checkin_core::store::{CheckInStore, IdentityDirectory};
use checkin_core::types::{ParticipantMatch, ParticipantRegistration, UserId};
use tracing::debug;

use crate::CheckInService;

/// Queries shorter than this (after trimming) return nothing.
pub const MIN_QUERY_LEN: usize = 2;

/// Maximum number of people returned by one search.
pub const MAX_MATCHES: usize = 50;

impl<S, D> CheckInService<S, D>
where
    S: CheckInStore,
    D: IdentityDirectory,
{
    /// Find people by display name, identity or secondary identifier, each
    /// with their registrations across all workshops.
    ///
    /// # Errors
    ///
    /// Returns error if the directory or store lookup fails.
    pub async fn search_participants(&self, query: &str) -> Result<Vec<ParticipantMatch>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }

        let people = self.directory.search(query, MAX_MATCHES).await?;
        if people.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: Vec<UserId> = people.iter().map(|p| p.user_id).collect();
        let mut by_user: HashMap<UserId, Vec<ParticipantRegistration>> = HashMap::new();
        for (registration, workshop_title) in self.store.registrations_for_users(&user_ids).await? {
            let Some(user_id) = registration.holder.user_id() else {
                continue;
            };
            by_user.entry(user_id).or_default().push(ParticipantRegistration {
                registration_id: registration.id,
                workshop_id: registration.workshop_id,
                workshop_title,
                attended: registration.is_attended(),
                code: registration.code,
                status: registration.status,
            });
        }

        debug!(query, matches = people.len(), "Participant search");

        Ok(people
            .into_iter()
            .map(|holder| {
                let mut registrations = by_user.remove(&holder.user_id).unwrap_or_default();
                registrations.sort_by_key(|r| r.registration_id);
                ParticipantMatch {
                    holder,
                    registrations,
                }
            })
            .collect())
    }
}
