//! Expense API endpoints
//!
//! All routes require authentication and act on the caller's own expenses:
//! - GET /api/expenses - List, most recent first
//! - POST /api/expenses - Add
//! - PUT /api/expenses/{id} - Partial update
//! - DELETE /api/expenses/{id} - Delete

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};

use crate::api::auth::MessageResponse;
use crate::api::middleware::{ApiError, ApiJson, ApiPath, AppState, AuthenticatedUser};
use crate::models::{CreateExpenseInput, Expense, UpdateExpenseInput};
use crate::services::expense::ExpenseServiceError;

impl From<ExpenseServiceError> for ApiError {
    fn from(err: ExpenseServiceError) -> Self {
        match err {
            ExpenseServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ExpenseServiceError::NotFound => ApiError::not_found("Expense not found"),
            ExpenseServiceError::Forbidden => ApiError::forbidden("Not authorized"),
            ExpenseServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

/// Build expense routes (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_expenses).post(add_expense))
        .route("/{id}", put(update_expense).delete(delete_expense))
}

/// GET /api/expenses
async fn list_expenses(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<Expense>>, ApiError> {
    Ok(Json(state.expense_service.list(user_id).await?))
}

/// POST /api/expenses
async fn add_expense(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    ApiJson(body): ApiJson<CreateExpenseInput>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let expense = state.expense_service.add(user_id, body).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

/// PUT /api/expenses/{id}
async fn update_expense(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateExpenseInput>,
) -> Result<Json<Expense>, ApiError> {
    Ok(Json(state.expense_service.update(user_id, id, body).await?))
}

/// DELETE /api/expenses/{id}
async fn delete_expense(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.expense_service.delete(user_id, id).await?;
    Ok(Json(MessageResponse::new("Expense removed")))
}
