//! Identity directory over the `users` table.

use checkin_core::error::Result;
use checkin_core::store::IdentityDirectory;
use checkin_core::types::{HolderIdentity, UserId};
use sqlx::PgPool;

use crate::rows::{db_error, row_to_identity};

/// Read-only view of the application's users.
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    /// Create a directory over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escape `LIKE` metacharacters so the query is matched literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl IdentityDirectory for PostgresDirectory {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<HolderIdentity>> {
        sqlx::query(
            "SELECT id, email, display_name, secondary_id FROM users \
             WHERE lower(email) = lower($1)",
        )
        .bind(identity.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to look up identity"))?
        .map(|row| row_to_identity(&row))
        .transpose()
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<HolderIdentity>> {
        sqlx::query("SELECT id, email, display_name, secondary_id FROM users WHERE id = $1")
            .bind(user_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load user"))?
            .map(|row| row_to_identity(&row))
            .transpose()
    }

    #[tracing::instrument(skip(self), name = "postgres_user_search")]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<HolderIdentity>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            "SELECT id, email, display_name, secondary_id FROM users \
             WHERE display_name ILIKE $1 OR email ILIKE $1 OR secondary_id ILIKE $1 \
             ORDER BY display_name, id \
             LIMIT $2",
        )
        .bind(like_pattern(query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to search users"))?;

        rows.iter().map(row_to_identity).collect()
    }
}
