//! Shared test utilities for database operations

use sqlx::SqlitePool;

use super::Database;

/// Create an in-memory test database pool with the production schema
pub async fn test_pool() -> SqlitePool {
    let db = Database::new(None)
        .await
        .expect("Failed to create test database");
    db.pool().clone()
}
