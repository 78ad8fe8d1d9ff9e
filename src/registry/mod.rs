//! User registry
//!
//! Records every Telegram user that sends `/start`. Inserts are idempotent:
//! the first username seen for a Telegram id is kept.

use sqlx::sqlite::SqlitePool;
use thiserror::Error;
use tracing::{debug, error};

/// Placeholder stored for users without a Telegram username
pub const NO_USERNAME: &str = "<No Username>";

/// Registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub telegram_id: i64,
}

/// Registry errors
///
/// The storage detail is logged, never rendered.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("user storage unavailable")]
    Storage(#[source] sqlx::Error),
}

/// Registry of users who have started the bot
#[derive(Clone)]
pub struct UserRegistry {
    pool: SqlitePool,
}

impl UserRegistry {
    /// Create a registry over an open pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a user; a no-op if the Telegram id is already known
    pub async fn add_user(&self, username: &str, telegram_id: i64) -> Result<(), RegistryError> {
        let result = sqlx::query("INSERT OR IGNORE INTO users (username, telegram_id) VALUES (?, ?)")
            .bind(username)
            .bind(telegram_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Error adding user {} to database: {}", telegram_id, e);
                RegistryError::Storage(e)
            })?;

        if result.rows_affected() > 0 {
            debug!("Registered user {} ({})", username, telegram_id);
        }
        Ok(())
    }

    /// Look up a user by Telegram id
    pub async fn find_user(&self, telegram_id: i64) -> Result<Option<UserRecord>, RegistryError> {
        let row: Option<(i64, Option<String>, i64)> =
            sqlx::query_as("SELECT id, username, telegram_id FROM users WHERE telegram_id = ?")
                .bind(telegram_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Error reading user {}: {}", telegram_id, e);
                    RegistryError::Storage(e)
                })?;

        Ok(row.map(|(id, username, telegram_id)| UserRecord {
            id,
            username: username.unwrap_or_default(),
            telegram_id,
        }))
    }

    /// Number of registered users
    pub async fn count(&self) -> Result<i64, RegistryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Error counting users: {}", e);
                RegistryError::Storage(e)
            })?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_pool;

    #[tokio::test]
    async fn test_add_user() {
        let registry = UserRegistry::new(test_pool().await);

        registry.add_user("alice", 42).await.unwrap();

        let user = registry.find_user(42).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.telegram_id, 42);
    }

    #[tokio::test]
    async fn test_add_user_is_idempotent() {
        let registry = UserRegistry::new(test_pool().await);

        registry.add_user("alice", 42).await.unwrap();
        registry.add_user("alice", 42).await.unwrap();

        assert_eq!(registry.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_username_not_updated_on_conflict() {
        let registry = UserRegistry::new(test_pool().await);

        registry.add_user("alice", 42).await.unwrap();
        registry.add_user("mallory", 42).await.unwrap();

        let user = registry.find_user(42).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(registry.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distinct_users() {
        let registry = UserRegistry::new(test_pool().await);

        registry.add_user("alice", 1).await.unwrap();
        registry.add_user(NO_USERNAME, 2).await.unwrap();

        assert_eq!(registry.count().await.unwrap(), 2);
        assert!(registry.find_user(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_error_hides_detail() {
        let pool = test_pool().await;
        pool.close().await;
        let registry = UserRegistry::new(pool);

        let err = registry.add_user("alice", 42).await.unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));
        assert_eq!(err.to_string(), "user storage unavailable");
    }
}
