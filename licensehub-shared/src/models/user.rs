/// User model and database operations
///
/// Accounts are created and authenticated by the external auth system. The
/// license subsystem only reads the identity fields it needs: the email (for
/// sub-license assignment) and the username (for naming team organizations).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL UNIQUE,
///     username VARCHAR(255),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// User account as seen by the license subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Email address, unique across all users
    pub email: String,

    /// Optional display handle
    pub username: Option<String>,

    /// When the user was created
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name used when deriving an organization name for this user
    ///
    /// Falls back to the local part of the email when no username is set.
    pub fn display_handle(&self) -> &str {
        match self.username.as_deref() {
            Some(name) if !name.trim().is_empty() => name.trim(),
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

/// Input for creating a user row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address
    pub email: String,

    /// Optional display handle
    pub username: Option<String>,
}

impl User {
    /// Inserts a user row
    ///
    /// # Errors
    ///
    /// Returns an error if the email already exists or the database is unreachable
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username)
            VALUES ($1, $2)
            RETURNING id, email, username, created_at
            "#,
        )
        .bind(data.email)
        .bind(data.username)
        .fetch_one(executor)
        .await
    }

    /// Mirrors an authenticated identity into `users`
    ///
    /// Inserts the row with the caller's ID, or refreshes the email of an
    /// existing row. The username is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if another user already holds the email
    pub async fn upsert_identity<'e, E>(executor: E, id: Uuid, email: &str) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, username, created_at
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_one(executor)
        .await
    }

    /// Finds a user by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Finds a user by email (exact match)
    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(executor)
        .await
    }
}
