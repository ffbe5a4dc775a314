//! User repository
//!
//! Accounts are looked up by id (from a session token) or by exact email
//! (at login). Both drivers share the same SQL; only the pool type and the
//! way the new row id is reported differ.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const INSERT_USER: &str = "INSERT INTO users \
    (name, email, password_hash, google_id, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?)";

const SELECT_BY_ID: &str = "SELECT id, name, email, password_hash, google_id, created_at, updated_at \
    FROM users WHERE id = ?";

const SELECT_BY_EMAIL: &str = "SELECT id, name, email, password_hash, google_id, created_at, updated_at \
    FROM users WHERE email = ?";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; fails on a duplicate email
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Exact, case-sensitive match
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        Ok(self.get_by_email(email).await?.is_some())
    }
}

/// How a single user is looked up
#[derive(Debug, Clone, Copy)]
enum UserKey<'a> {
    Id(i64),
    Email(&'a str),
}

impl UserKey<'_> {
    fn sql(self) -> &'static str {
        match self {
            UserKey::Id(_) => SELECT_BY_ID,
            UserKey::Email(_) => SELECT_BY_EMAIL,
        }
    }
}

/// Build a `User` from a row of either driver, propagating decode errors
macro_rules! user_from_row {
    ($row:expr) => {{
        let row = $row;
        User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            google_id: row.try_get("google_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }
    }};
}

/// User repository over SQLite or MySQL
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Shared handle for injection into services
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find(&self, key: UserKey<'_>) -> Result<Option<User>> {
        let sql = key.sql();
        let user = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let query = match key {
                    UserKey::Id(id) => sqlx::query(sql).bind(id),
                    UserKey::Email(email) => sqlx::query(sql).bind(email),
                };
                match query.fetch_optional(self.pool.sqlite()?).await? {
                    Some(row) => Some(user_from_row!(&row)),
                    None => None,
                }
            }
            DatabaseDriver::Mysql => {
                let query = match key {
                    UserKey::Id(id) => sqlx::query(sql).bind(id),
                    UserKey::Email(email) => sqlx::query(sql).bind(email),
                };
                match query.fetch_optional(self.pool.mysql()?).await? {
                    Some(row) => Some(user_from_row!(&row)),
                    None => None,
                }
            }
        };
        Ok(user)
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_USER)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.google_id)
                .bind(now)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create user")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_USER)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.google_id)
                .bind(now)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create user")?
                .last_insert_id() as i64,
        };

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        self.find(UserKey::Id(id))
            .await
            .with_context(|| format!("Failed to load user {}", id))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find(UserKey::Email(email))
            .await
            .context("Failed to look up user by email")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::services::password::hash_password;

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn create_test_user(name: &str, email: &str) -> User {
        User::new(
            name.to_string(),
            email.to_string(),
            Some(hash_password("Password1").expect("Failed to hash password")),
        )
    }

    #[tokio::test]
    async fn test_create_user() {
        let repo = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("Ada", "ada@example.com"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.name, "Ada");
        assert_eq!(created.email, "ada@example.com");
        assert!(created.has_password());
    }

    #[tokio::test]
    async fn test_create_provider_only_user() {
        let repo = setup_test_repo().await;
        let user = User::new("Bob".into(), "bob@example.com".into(), None).with_google_id("g-123");
        let created = repo.create(&user).await.unwrap();

        let found = repo.get_by_id(created.id).await.unwrap().expect("User not found");
        assert!(found.password_hash.is_none());
        assert_eq!(found.google_id.as_deref(), Some("g-123"));
    }

    #[tokio::test]
    async fn test_get_user_by_id_not_found() {
        let repo = setup_test_repo().await;
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_user_by_email_is_case_sensitive() {
        let repo = setup_test_repo().await;
        repo.create(&create_test_user("Ada", "ada@example.com")).await.unwrap();

        assert!(repo.get_by_email("ada@example.com").await.unwrap().is_some());
        assert!(repo.get_by_email("ADA@example.com").await.unwrap().is_none());
        assert!(repo.exists_by_email("ada@example.com").await.unwrap());
        assert!(!repo.exists_by_email("nobody@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&create_test_user("Ada", "ada@example.com")).await.unwrap();

        let result = repo.create(&create_test_user("Other", "ada@example.com")).await;
        assert!(result.is_err());
    }
}
