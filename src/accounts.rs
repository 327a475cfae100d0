//! User accounts for sign-up / sign-in.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::database::DatabasePool;
use crate::error::AuthError;
use crate::models::User;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user. Fails with `UserAlreadyExists` if the username is taken.
    async fn create_user(&self, user: &User) -> Result<(), AuthError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: DatabasePool,
}

impl PgUserStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Replace the stored hash for an existing user. Returns false if no such user.
    pub async fn update_password_hash(&self, username: &str, password_hash: &str) -> Result<bool, AuthError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE username = $2")
            .bind(password_hash)
            .bind(username)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, user: &User) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1 LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(user)
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, user: &User) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.username) {
            return Err(AuthError::UserAlreadyExists);
        }
        users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.read().await.get(username).cloned())
    }
}
