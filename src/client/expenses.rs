//! Locally held expense list
//!
//! The list is fetched once; afterwards each mutation is applied to the
//! local copy from the server's reply instead of refetching.

use chrono::{DateTime, Utc};

use super::summary::{self, CategoryFilter, Summary};
use super::{ApiClient, ClientError};
use crate::models::{CreateExpenseInput, Expense, UpdateExpenseInput};

/// The signed-in user's expenses, most recent first
#[derive(Debug, Clone)]
pub struct ExpenseBoard {
    api: ApiClient,
    expenses: Vec<Expense>,
}

impl ExpenseBoard {
    /// Board over an authenticated client; empty until `load()`
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            expenses: Vec::new(),
        }
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub async fn load(&mut self) -> Result<&[Expense], ClientError> {
        self.expenses = self.api.list_expenses().await?;
        Ok(&self.expenses)
    }

    /// Submit a new expense and prepend the stored record
    pub async fn add(&mut self, input: &CreateExpenseInput) -> Result<&Expense, ClientError> {
        let expense = self.api.add_expense(input).await?;
        self.expenses.insert(0, expense);
        Ok(&self.expenses[0])
    }

    /// Submit a partial update and replace the local record in place
    pub async fn update(
        &mut self,
        id: i64,
        input: &UpdateExpenseInput,
    ) -> Result<&Expense, ClientError> {
        let updated = self.api.update_expense(id, input).await?;
        let index = match self.expenses.iter().position(|e| e.id == id) {
            Some(index) => {
                self.expenses[index] = updated;
                index
            }
            None => {
                self.expenses.insert(0, updated);
                0
            }
        };
        Ok(&self.expenses[index])
    }

    /// Delete on the server, then drop the local record
    pub async fn remove(&mut self, id: i64) -> Result<(), ClientError> {
        self.api.delete_expense(id).await?;
        self.expenses.retain(|e| e.id != id);
        Ok(())
    }

    pub fn filter(&self, filter: &CategoryFilter) -> Vec<&Expense> {
        summary::filter_expenses(&self.expenses, filter)
    }

    /// Categories present in the list, in first-seen order
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for expense in &self.expenses {
            if !seen.contains(&expense.category.as_str()) {
                seen.push(expense.category.as_str());
            }
        }
        seen
    }

    /// Totals relative to `now`, recomputed on every call
    pub fn summary(&self, now: DateTime<Utc>) -> Summary {
        summary::summarize(&self.expenses, now)
    }
}
