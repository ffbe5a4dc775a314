//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity.

pub mod expense;
pub mod user;

pub use expense::{ExpenseRepository, SqlxExpenseRepository};
pub use user::{SqlxUserRepository, UserRepository};
