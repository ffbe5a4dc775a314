//! User model
//!
//! A user owns expenses and signs in either with a password or through a
//! third-party identity provider. Accounts created by the provider flow have
//! no password hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Email address (unique, case-sensitive)
    pub email: String,
    /// Password hash (argon2), absent for provider-only accounts
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    /// Subject id at the identity provider
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub google_id: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a user that has not been stored yet.
    ///
    /// The password must already be hashed, see `services::password::hash_password()`.
    pub fn new(name: String, email: String, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            name,
            email,
            password_hash,
            google_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach an identity provider subject
    pub fn with_google_id(mut self, google_id: impl Into<String>) -> Self {
        self.google_id = Some(google_id.into());
        self
    }

    /// Whether the account can sign in with a password
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl CreateUserInput {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: Option<&str>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.map(str::to_string),
        }
    }
}
