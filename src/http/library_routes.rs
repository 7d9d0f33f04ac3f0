//! Library Routes
//!
//! Catalogue reads plus the borrow and return workflows.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::response::{bad_request, error_response, json_body, required_id, success, ApiResult};
use crate::gateway::Gateway;
use crate::ops::{LoanReceipt, ReturnReceipt};

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Default, Deserialize)]
pub struct BorrowRequest {
    #[serde(default, alias = "id_etudiant")]
    pub student_id: Option<i64>,
    #[serde(default, alias = "id_livre")]
    pub book_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnRequest {
    #[serde(default, alias = "id_emprunt")]
    pub loan_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BooksResponse {
    pub books: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct LoansResponse {
    pub loans: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse<T: Serialize> {
    pub message: String,
    #[serde(flatten)]
    pub receipt: T,
}

// ==================
// Library Routes
// ==================

pub fn library_routes(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/books/available", get(available_handler))
        .route("/books/my-loans/:student_id", get(my_loans_handler))
        .route("/books/borrow", post(borrow_handler))
        .route("/books/return", post(return_handler))
        .with_state(gateway)
}

// ==================
// Handlers
// ==================

async fn available_handler(State(gateway): State<Arc<Gateway>>) -> ApiResult<BooksResponse> {
    let books = gateway.available_books().await.map_err(error_response)?;
    success(BooksResponse { books })
}

async fn my_loans_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(student_id): Path<String>,
) -> ApiResult<LoansResponse> {
    let student_id = required_id(Some(&student_id), "Student ID required")?;
    let loans = gateway
        .student_loans(student_id)
        .await
        .map_err(error_response)?;
    success(LoansResponse { loans })
}

async fn borrow_handler(
    State(gateway): State<Arc<Gateway>>,
    payload: Result<Json<BorrowRequest>, JsonRejection>,
) -> ApiResult<ReceiptResponse<LoanReceipt>> {
    const MISSING: &str = "Student ID and Book ID required";
    let request = json_body(payload, MISSING)?;
    let (student_id, book_id) = match (request.student_id, request.book_id) {
        (Some(student_id), Some(book_id)) => (student_id, book_id),
        _ => return Err(bad_request(MISSING)),
    };
    let receipt = gateway
        .borrow_book(student_id, book_id)
        .await
        .map_err(error_response)?;
    success(ReceiptResponse {
        message: "Book borrowed successfully".to_string(),
        receipt,
    })
}

async fn return_handler(
    State(gateway): State<Arc<Gateway>>,
    payload: Result<Json<ReturnRequest>, JsonRejection>,
) -> ApiResult<ReceiptResponse<ReturnReceipt>> {
    const MISSING: &str = "Loan ID required";
    let loan_id = json_body(payload, MISSING)?
        .loan_id
        .ok_or_else(|| bad_request(MISSING))?;
    let receipt = gateway.return_book(loan_id).await.map_err(error_response)?;
    success(ReceiptResponse {
        message: "Book returned successfully".to_string(),
        receipt,
    })
}
