//! Expense service
//!
//! CRUD over expenses, always on behalf of an authenticated user. Reads are
//! scoped to the caller; updates and deletes of someone else's expense are
//! refused with `Forbidden`.

use crate::db::repositories::ExpenseRepository;
use crate::models::{CreateExpenseInput, Expense, UpdateExpenseInput};
use std::sync::Arc;

/// Error types for expense service operations
#[derive(Debug, thiserror::Error)]
pub enum ExpenseServiceError {
    /// Malformed input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No expense with this id
    #[error("Expense not found")]
    NotFound,

    /// The expense belongs to another user
    #[error("Not authorized")]
    Forbidden,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Expense service
pub struct ExpenseService {
    repo: Arc<dyn ExpenseRepository>,
}

impl ExpenseService {
    /// Create a new expense service
    pub fn new(repo: Arc<dyn ExpenseRepository>) -> Self {
        Self { repo }
    }

    /// Add an expense owned by `user_id`; the date defaults to now
    pub async fn add(
        &self,
        user_id: i64,
        input: CreateExpenseInput,
    ) -> Result<Expense, ExpenseServiceError> {
        if input.title.trim().is_empty() {
            return Err(ExpenseServiceError::ValidationError("Title is required".into()));
        }
        if input.category.trim().is_empty() {
            return Err(ExpenseServiceError::ValidationError("Category is required".into()));
        }

        let expense = self.repo.create(&Expense::new(user_id, input)).await?;
        tracing::debug!("User {} added expense {}", user_id, expense.id);
        Ok(expense)
    }

    /// All expenses of `user_id`, most recent first
    pub async fn list(&self, user_id: i64) -> Result<Vec<Expense>, ExpenseServiceError> {
        Ok(self.repo.list_by_user(user_id).await?)
    }

    /// Apply a partial update to an expense owned by `user_id`
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        input: UpdateExpenseInput,
    ) -> Result<Expense, ExpenseServiceError> {
        let mut expense = self.owned_expense(user_id, id).await?;
        expense.apply(input);
        Ok(self.repo.update(&expense).await?)
    }

    /// Permanently delete an expense owned by `user_id`
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), ExpenseServiceError> {
        self.owned_expense(user_id, id).await?;
        if !self.repo.delete(id).await? {
            // Removed concurrently between the lookup and the delete
            return Err(ExpenseServiceError::NotFound);
        }
        tracing::debug!("User {} deleted expense {}", user_id, id);
        Ok(())
    }

    async fn owned_expense(&self, user_id: i64, id: i64) -> Result<Expense, ExpenseServiceError> {
        let expense = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(ExpenseServiceError::NotFound)?;

        if !expense.is_owned_by(user_id) {
            tracing::warn!(
                "User {} attempted to modify expense {} owned by user {}",
                user_id,
                id,
                expense.user_id
            );
            return Err(ExpenseServiceError::Forbidden);
        }
        Ok(expense)
    }
}
