//! Data models
//!
//! Entities stored by the server and exchanged with clients:
//! - `User` and its registration input
//! - `Expense` and its create/update inputs

mod expense;
mod user;

pub use expense::{flexible_amount, flexible_date, CreateExpenseInput, Expense, UpdateExpenseInput};
pub use user::{CreateUserInput, User};
