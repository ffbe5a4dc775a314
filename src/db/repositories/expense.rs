//! Expense repository
//!
//! Database operations for expenses. Ownership is not checked here; the
//! service layer decides who may touch a row.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Expense;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Expense repository trait
#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    /// Insert a new expense
    async fn create(&self, expense: &Expense) -> Result<Expense>;

    /// Get expense by ID, regardless of owner
    async fn get_by_id(&self, id: i64) -> Result<Option<Expense>>;

    /// All expenses of a user, newest date first
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Expense>>;

    /// Persist the mutable fields of an expense
    async fn update(&self, expense: &Expense) -> Result<Expense>;

    /// Delete an expense, returning whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based expense repository implementation
pub struct SqlxExpenseRepository {
    pool: DynDatabasePool,
}

impl SqlxExpenseRepository {
    /// Create a new SQLx expense repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ExpenseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ExpenseRepository for SqlxExpenseRepository {
    async fn create(&self, expense: &Expense) -> Result<Expense> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_expense_sqlite(self.pool.sqlite()?, expense).await,
            DatabaseDriver::Mysql => create_expense_mysql(self.pool.mysql()?, expense).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Expense>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_expense_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_expense_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Expense>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_expenses_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => list_expenses_mysql(self.pool.mysql()?, user_id).await,
        }
    }

    async fn update(&self, expense: &Expense) -> Result<Expense> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_expense_sqlite(self.pool.sqlite()?, expense).await,
            DatabaseDriver::Mysql => update_expense_mysql(self.pool.mysql()?, expense).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM expenses WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete expense")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM expenses WHERE id = ?")
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete expense")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_expense_sqlite(pool: &SqlitePool, expense: &Expense) -> Result<Expense> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO expenses (user_id, title, amount, category, date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(expense.user_id)
    .bind(&expense.title)
    .bind(expense.amount)
    .bind(&expense.category)
    .bind(expense.date)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create expense")?;

    Ok(Expense {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..expense.clone()
    })
}

async fn get_expense_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Expense>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, title, amount, category, date, created_at, updated_at
        FROM expenses
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get expense by ID")?;

    row.as_ref().map(row_to_expense_sqlite).transpose()
}

async fn list_expenses_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Vec<Expense>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, title, amount, category, date, created_at, updated_at
        FROM expenses
        WHERE user_id = ?
        ORDER BY date DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list expenses")?;

    rows.iter().map(row_to_expense_sqlite).collect()
}

async fn update_expense_sqlite(pool: &SqlitePool, expense: &Expense) -> Result<Expense> {
    sqlx::query(
        r#"
        UPDATE expenses
        SET title = ?, amount = ?, category = ?, date = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&expense.title)
    .bind(expense.amount)
    .bind(&expense.category)
    .bind(expense.date)
    .bind(expense.updated_at)
    .bind(expense.id)
    .execute(pool)
    .await
    .context("Failed to update expense")?;

    get_expense_by_id_sqlite(pool, expense.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Expense not found after update"))
}

fn row_to_expense_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Expense> {
    Ok(Expense {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        amount: row.try_get("amount")?,
        category: row.try_get("category")?,
        date: row.try_get("date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_expense_mysql(pool: &MySqlPool, expense: &Expense) -> Result<Expense> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO expenses (user_id, title, amount, category, date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(expense.user_id)
    .bind(&expense.title)
    .bind(expense.amount)
    .bind(&expense.category)
    .bind(expense.date)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create expense")?;

    Ok(Expense {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..expense.clone()
    })
}

async fn get_expense_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Expense>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, title, amount, category, date, created_at, updated_at
        FROM expenses
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get expense by ID")?;

    row.as_ref().map(row_to_expense_mysql).transpose()
}

async fn list_expenses_mysql(pool: &MySqlPool, user_id: i64) -> Result<Vec<Expense>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, title, amount, category, date, created_at, updated_at
        FROM expenses
        WHERE user_id = ?
        ORDER BY date DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list expenses")?;

    rows.iter().map(row_to_expense_mysql).collect()
}

async fn update_expense_mysql(pool: &MySqlPool, expense: &Expense) -> Result<Expense> {
    sqlx::query(
        r#"
        UPDATE expenses
        SET title = ?, amount = ?, category = ?, date = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&expense.title)
    .bind(expense.amount)
    .bind(&expense.category)
    .bind(expense.date)
    .bind(expense.updated_at)
    .bind(expense.id)
    .execute(pool)
    .await
    .context("Failed to update expense")?;

    get_expense_by_id_mysql(pool, expense.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Expense not found after update"))
}

fn row_to_expense_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Expense> {
    Ok(Expense {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        amount: row.try_get("amount")?,
        category: row.try_get("category")?,
        date: row.try_get("date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreateExpenseInput, User};
    use chrono::{Duration, TimeZone};

    async fn setup_test_repo() -> (SqlxExpenseRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let alice = users
            .create(&User::new("Alice".into(), "alice@example.com".into(), None))
            .await
            .unwrap();
        let bob = users
            .create(&User::new("Bob".into(), "bob@example.com".into(), None))
            .await
            .unwrap();

        (SqlxExpenseRepository::new(pool), alice.id, bob.id)
    }

    #[tokio::test]
    async fn test_create_and_get_expense() {
        let (repo, alice, _) = setup_test_repo().await;
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let expense = Expense::new(alice, CreateExpenseInput::new("Coffee", 3.2, "Food").with_date(date));

        let created = repo.create(&expense).await.expect("Failed to create expense");
        assert!(created.id > 0);

        let found = repo.get_by_id(created.id).await.unwrap().expect("Expense not found");
        assert_eq!(found.title, "Coffee");
        assert_eq!(found.amount, 3.2);
        assert_eq!(found.user_id, alice);
        assert_eq!(found.date, date);
    }

    #[tokio::test]
    async fn test_list_scoped_and_ordered() {
        let (repo, alice, bob) = setup_test_repo().await;
        let now = Utc::now();

        for (title, days_ago) in [("old", 10), ("new", 0), ("mid", 3)] {
            let input = CreateExpenseInput::new(title, 1.0, "Other").with_date(now - Duration::days(days_ago));
            repo.create(&Expense::new(alice, input)).await.unwrap();
        }
        repo.create(&Expense::new(bob, CreateExpenseInput::new("bob's", 5.0, "Other")))
            .await
            .unwrap();

        let titles: Vec<String> = repo
            .list_by_user(alice)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
        assert_eq!(repo.list_by_user(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_expense() {
        let (repo, alice, _) = setup_test_repo().await;
        let mut created = repo
            .create(&Expense::new(alice, CreateExpenseInput::new("Taxi", 20.0, "Transport")))
            .await
            .unwrap();

        created.amount = 0.0;
        created.title = "Bus".into();
        let updated = repo.update(&created).await.unwrap();

        assert_eq!(updated.amount, 0.0);
        assert_eq!(updated.title, "Bus");
        assert_eq!(updated.user_id, alice);
    }

    #[tokio::test]
    async fn test_delete_expense() {
        let (repo, alice, _) = setup_test_repo().await;
        let created = repo
            .create(&Expense::new(alice, CreateExpenseInput::new("Gym", 30.0, "Health")))
            .await
            .unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
        assert!(!repo.delete(created.id).await.unwrap());
    }
}
