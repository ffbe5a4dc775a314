//! Client library for the expense tracker API
//!
//! - `ApiClient`: typed calls to every endpoint over reqwest
//! - `session`: token storage and the sign-in state machine
//! - `expenses`: the locally held, optimistically updated expense list
//! - `summary`: rolling totals and category breakdown

pub mod expenses;
pub mod session;
pub mod summary;

pub use expenses::ExpenseBoard;
pub use session::{FileSessionStore, MemorySessionStore, Route, SessionClient, SessionState, SessionStore};
pub use summary::{CategoryFilter, CategoryTotal, Summary, DEFAULT_CATEGORIES};

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{CreateExpenseInput, Expense, UpdateExpenseInput, User};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side failures. Nothing is retried.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure or undecodable response
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The session store could not be read or written
    #[error("Session store error: {0}")]
    Store(#[source] anyhow::Error),

    /// The operation needs a signed-in session
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl ClientError {
    /// HTTP status of an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: String,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

/// Result of validating a stored token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidation {
    pub valid: bool,
    pub user_id: i64,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct GoogleLoginBody<'a> {
    token: &'a str,
}

/// Thin typed wrapper over the REST API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for the server at `base_url` (e.g. `http://localhost:5000`)
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach a bearer token to subsequent requests
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }

    /// POST /api/users/register
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: Option<&str>,
    ) -> Result<String, ClientError> {
        let body = RegisterBody {
            name,
            email,
            password,
        };
        let reply: MessageBody = self
            .send(self.request(Method::POST, "/api/users/register").json(&body))
            .await?;
        Ok(reply.message)
    }

    /// POST /api/users/login, returning the session token
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        let reply: TokenBody = self
            .send(
                self.request(Method::POST, "/api/users/login")
                    .json(&LoginBody { email, password }),
            )
            .await?;
        Ok(reply.token)
    }

    /// POST /api/users/google-login, returning the session token
    pub async fn google_login(&self, id_token: &str) -> Result<String, ClientError> {
        let reply: TokenBody = self
            .send(
                self.request(Method::POST, "/api/users/google-login")
                    .json(&GoogleLoginBody { token: id_token }),
            )
            .await?;
        Ok(reply.token)
    }

    /// GET /api/users/validate
    pub async fn validate(&self) -> Result<TokenValidation, ClientError> {
        self.send(self.request(Method::GET, "/api/users/validate")).await
    }

    /// GET /api/users/me
    pub async fn me(&self) -> Result<User, ClientError> {
        self.send(self.request(Method::GET, "/api/users/me")).await
    }

    /// GET /api/expenses
    pub async fn list_expenses(&self) -> Result<Vec<Expense>, ClientError> {
        self.send(self.request(Method::GET, "/api/expenses")).await
    }

    /// POST /api/expenses
    pub async fn add_expense(&self, input: &CreateExpenseInput) -> Result<Expense, ClientError> {
        self.send(self.request(Method::POST, "/api/expenses").json(input))
            .await
    }

    /// PUT /api/expenses/{id}
    pub async fn update_expense(
        &self,
        id: i64,
        input: &UpdateExpenseInput,
    ) -> Result<Expense, ClientError> {
        self.send(
            self.request(Method::PUT, &format!("/api/expenses/{}", id))
                .json(input),
        )
        .await
    }

    /// DELETE /api/expenses/{id}
    pub async fn delete_expense(&self, id: i64) -> Result<String, ClientError> {
        let reply: MessageBody = self
            .send(self.request(Method::DELETE, &format!("/api/expenses/{}", id)))
            .await?;
        Ok(reply.message)
    }
}

fn api_error(status: StatusCode, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ClientError::Api {
            status: status.as_u16(),
            code: Some(envelope.error.code),
            message: envelope.error.message,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            code: None,
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                body.to_string()
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_from_envelope() {
        let err = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"code": "CONFLICT", "message": "User already exists"}}"#,
        );
        match err {
            ClientError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("CONFLICT"));
                assert_eq!(message, "User already exists");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_api_error_from_plain_body() {
        let err = api_error(StatusCode::NOT_FOUND, "");
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:5000");
        assert!(client.token().is_none());
    }
}
