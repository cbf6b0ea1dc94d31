//! # User Repository
//!
//! Users are owned by the identity layer; this crate only needs to know who
//! the administrators are when an order lands.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use basket_core::{User, UserRole};

/// Repository for user lookups.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    pub async fn insert(&self, email: &str, role: UserRole) -> DbResult<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_lowercase(),
            role,
            created_at: Utc::now(),
        };
        debug!(id = %user.id, role = ?role, "Inserting user");

        sqlx::query("INSERT INTO users (id, email, role, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(user.role)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, role, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Ids of every administrator, oldest first.
    pub async fn admin_ids(&self) -> DbResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM users WHERE role = 'admin' ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
