//! HTTP-level tests against the full router

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;

use expense_tracker::api::{build_router, AppState};
use expense_tracker::config::AuthConfig;
use expense_tracker::db::{create_test_pool, migrations};
use expense_tracker::services::{IdentityClaims, IdentityError, IdentityVerifier};

/// Accepts `valid:<email>:<name>` as an identity assertion
struct StubVerifier;

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify(&self, assertion: &str) -> Result<IdentityClaims, IdentityError> {
        let mut parts = assertion.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("valid"), Some(email), Some(name)) => Ok(IdentityClaims {
                subject: format!("google-{}", email),
                email: email.to_string(),
                name: name.to_string(),
            }),
            _ => Err(IdentityError::Rejected("signature mismatch".into())),
        }
    }
}

async fn test_server() -> TestServer {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let auth = AuthConfig {
        jwt_secret: "integration-secret".to_string(),
        ..AuthConfig::default()
    };
    let state = AppState::new(pool, &auth, Arc::new(StubVerifier));
    TestServer::new(build_router(state, "*")).expect("Failed to start test server")
}

async fn register(server: &TestServer, name: &str, email: &str) {
    server
        .post("/api/users/register")
        .json(&json!({"name": name, "email": email, "password": "Password1"}))
        .await
        .assert_status(StatusCode::CREATED);
}

async fn login(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/api/users/login")
        .json(&json!({"email": email, "password": "Password1"}))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["token"]
        .as_str()
        .expect("token in response")
        .to_string()
}

async fn signed_in(server: &TestServer, name: &str, email: &str) -> String {
    register(server, name, email).await;
    login(server, email).await
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_health() {
    let server = test_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_register_login_me_roundtrip() {
    let server = test_server().await;

    let response = server
        .post("/api/users/register")
        .json(&json!({"name": "Ada", "email": "ada@example.com", "password": "Password1"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(
        response.json::<Value>(),
        json!({"message": "User registered successfully"})
    );

    let token = login(&server, "ada@example.com").await;
    let me = server.get("/api/users/me").authorization_bearer(&token).await;
    me.assert_status_ok();

    let user = me.json::<Value>();
    assert_eq!(user["name"], "Ada");
    assert_eq!(user["email"], "ada@example.com");
    assert!(user.get("passwordHash").is_none());
    assert!(user.get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_rejects_weak_password() {
    let server = test_server().await;

    let response = server
        .post("/api/users/register")
        .json(&json!({"name": "Bob", "email": "bob@example.com", "password": "short"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json::<Value>()), "VALIDATION_ERROR");

    let login = server
        .post("/api/users/login")
        .json(&json!({"email": "bob@example.com", "password": "short"}))
        .await;
    login.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&login.json::<Value>()), "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let server = test_server().await;
    register(&server, "Ada", "ada@example.com").await;

    let response = server
        .post("/api/users/register")
        .json(&json!({"name": "Impostor", "email": "ada@example.com", "password": "Password2"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json::<Value>()), "CONFLICT");

    // Original credentials still work
    login(&server, "ada@example.com").await;
}

#[tokio::test]
async fn test_login_wrong_password() {
    let server = test_server().await;
    register(&server, "Ada", "ada@example.com").await;

    let response = server
        .post("/api/users/login")
        .json(&json!({"email": "ada@example.com", "password": "Password2"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json::<Value>()), "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_google_login_creates_account() {
    let server = test_server().await;

    let first = server
        .post("/api/users/google-login")
        .json(&json!({"token": "valid:grace@example.com:Grace"}))
        .await;
    first.assert_status_ok();
    let token = first.json::<Value>()["token"].as_str().unwrap().to_string();

    let me = server.get("/api/users/me").authorization_bearer(&token).await;
    me.assert_status_ok();
    let user = me.json::<Value>();
    assert_eq!(user["email"], "grace@example.com");

    // A second sign-in reuses the same account
    let second = server
        .post("/api/users/google-login")
        .json(&json!({"token": "valid:grace@example.com:Grace"}))
        .await;
    second.assert_status_ok();
    let token = second.json::<Value>()["token"].as_str().unwrap().to_string();
    let again = server.get("/api/users/me").authorization_bearer(&token).await;
    assert_eq!(again.json::<Value>()["id"], user["id"]);
}

#[tokio::test]
async fn test_google_login_rejected() {
    let server = test_server().await;
    let response = server
        .post("/api/users/google-login")
        .json(&json!({"token": "forged"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json::<Value>()), "VERIFICATION_FAILED");
}

#[tokio::test]
async fn test_validate_is_idempotent() {
    let server = test_server().await;
    let token = signed_in(&server, "Ada", "ada@example.com").await;

    let first = server.get("/api/users/validate").authorization_bearer(&token).await;
    let second = server.get("/api/users/validate").authorization_bearer(&token).await;
    first.assert_status_ok();
    second.assert_status_ok();

    let body = first.json::<Value>();
    assert_eq!(body["valid"], true);
    assert!(body["userId"].as_i64().unwrap() > 0);
    assert_eq!(body, second.json::<Value>());
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let server = test_server().await;

    let missing = server.get("/api/expenses").await;
    missing.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(
        missing.json::<Value>()["error"]["message"],
        "No token, authorization denied"
    );

    let garbage = server
        .get("/api/users/me")
        .authorization_bearer("not-a-token")
        .await;
    garbage.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.json::<Value>()["error"]["message"], "Token is not valid");
}

// ============================================================================
// Expenses
// ============================================================================

#[tokio::test]
async fn test_expense_crud() {
    let server = test_server().await;
    let token = signed_in(&server, "Ada", "ada@example.com").await;

    let created = server
        .post("/api/expenses")
        .authorization_bearer(&token)
        .json(&json!({"title": "Groceries", "amount": "42.50", "category": "Food", "date": "2024-05-01"}))
        .await;
    created.assert_status(StatusCode::CREATED);
    let expense = created.json::<Value>();
    let id = expense["id"].as_i64().unwrap();
    assert_eq!(expense["amount"], 42.5);

    let updated = server
        .put(&format!("/api/expenses/{}", id))
        .authorization_bearer(&token)
        .json(&json!({"amount": 0}))
        .await;
    updated.assert_status_ok();
    let updated = updated.json::<Value>();
    assert_eq!(updated["amount"], 0.0);
    assert_eq!(updated["title"], "Groceries");
    assert_eq!(updated["category"], "Food");

    let list = server.get("/api/expenses").authorization_bearer(&token).await;
    assert_eq!(list.json::<Vec<Value>>().len(), 1);

    let deleted = server
        .delete(&format!("/api/expenses/{}", id))
        .authorization_bearer(&token)
        .await;
    deleted.assert_status_ok();
    assert_eq!(deleted.json::<Value>(), json!({"message": "Expense removed"}));

    let list = server.get("/api/expenses").authorization_bearer(&token).await;
    assert!(list.json::<Vec<Value>>().is_empty());

    let again = server
        .delete(&format!("/api/expenses/{}", id))
        .authorization_bearer(&token)
        .await;
    again.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_expense_validation() {
    let server = test_server().await;
    let token = signed_in(&server, "Ada", "ada@example.com").await;

    let response = server
        .post("/api/expenses")
        .authorization_bearer(&token)
        .json(&json!({"title": "  ", "amount": 3, "category": "Food"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json::<Value>()), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_cross_user_access_forbidden() {
    let server = test_server().await;
    let ada = signed_in(&server, "Ada", "ada@example.com").await;
    let bob = signed_in(&server, "Bob", "bob@example.com").await;

    let created = server
        .post("/api/expenses")
        .authorization_bearer(&ada)
        .json(&json!({"title": "Rent", "amount": 900, "category": "Bills"}))
        .await;
    let id = created.json::<Value>()["id"].as_i64().unwrap();

    let update = server
        .put(&format!("/api/expenses/{}", id))
        .authorization_bearer(&bob)
        .json(&json!({"amount": 1}))
        .await;
    update.assert_status(StatusCode::FORBIDDEN);

    let delete = server
        .delete(&format!("/api/expenses/{}", id))
        .authorization_bearer(&bob)
        .await;
    delete.assert_status(StatusCode::FORBIDDEN);

    // Bob sees nothing; Ada's record is untouched
    let bobs = server.get("/api/expenses").authorization_bearer(&bob).await;
    assert!(bobs.json::<Vec<Value>>().is_empty());

    let adas = server.get("/api/expenses").authorization_bearer(&ada).await;
    let adas = adas.json::<Vec<Value>>();
    assert_eq!(adas.len(), 1);
    assert_eq!(adas[0]["amount"], 900.0);
}

#[tokio::test]
async fn test_update_missing_expense() {
    let server = test_server().await;
    let token = signed_in(&server, "Ada", "ada@example.com").await;

    let response = server
        .put("/api/expenses/9999")
        .authorization_bearer(&token)
        .json(&json!({"title": "Ghost"}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Malformed requests
// ============================================================================

#[tokio::test]
async fn test_register_missing_fields_uses_error_envelope() {
    let server = test_server().await;

    let response = server
        .post("/api/users/register")
        .json(&json!({"name": "A"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
    assert!(body["error"]["details"]["reason"]
        .as_str()
        .unwrap()
        .contains("email"));
}

#[tokio::test]
async fn test_add_expense_without_amount() {
    let server = test_server().await;
    let token = signed_in(&server, "Ada", "ada@example.com").await;

    let response = server
        .post("/api/expenses")
        .authorization_bearer(&token)
        .json(&json!({"title": "Lunch", "category": "Food"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json::<Value>()), "VALIDATION_ERROR");

    let list = server.get("/api/expenses").authorization_bearer(&token).await;
    assert!(list.json::<Vec<Value>>().is_empty());
}

#[tokio::test]
async fn test_non_numeric_expense_id() {
    let server = test_server().await;
    let token = signed_in(&server, "Ada", "ada@example.com").await;

    let update = server
        .put("/api/expenses/abc")
        .authorization_bearer(&token)
        .json(&json!({"amount": 1}))
        .await;
    update.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&update.json::<Value>()), "VALIDATION_ERROR");

    let delete = server
        .delete("/api/expenses/abc")
        .authorization_bearer(&token)
        .await;
    delete.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&delete.json::<Value>()), "VALIDATION_ERROR");
}
