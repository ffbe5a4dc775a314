//! Services layer - Business logic
//!
//! Services implement the rules of the expense tracker on top of the
//! repositories:
//! - Registration, login and session tokens
//! - Third-party identity verification
//! - Per-user expense CRUD

pub mod expense;
pub mod identity;
pub mod password;
pub mod token;
pub mod user;

pub use expense::{ExpenseService, ExpenseServiceError};
pub use identity::{GoogleIdentityVerifier, IdentityClaims, IdentityError, IdentityVerifier};
pub use password::{hash_password, validate_password_policy, verify_password, PasswordPolicyError};
pub use token::{Claims, JwtService, TokenError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
