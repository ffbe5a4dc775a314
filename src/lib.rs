//! Expense Tracker - a personal expense tracking service
//!
//! The server side (`api`, `services`, `db`) exposes a small REST API for
//! accounts and per-user expenses. The `client` module talks to that API
//! and keeps the session and expense list on the caller's side.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
