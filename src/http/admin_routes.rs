//! Admin Routes
//!
//! Inserts into each store, sample data loading and unfiltered listings.
//! Request bodies accept English field names or the column names.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::library_routes::{BooksResponse, LoansResponse, ReceiptResponse};
use super::response::{
    bad_request, error_response, json_body, success, ApiError, ApiResult, Success,
};
use crate::gateway::Gateway;
use crate::ops::LoanReceipt;
use crate::sql::{NewBook, NewGrade, NewStudent};

const MISSING_FIELDS: &str = "Missing required fields";
const DEFAULT_CATEGORY: &str = "Général";

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Default, Deserialize)]
pub struct InsertStudentRequest {
    #[serde(default, alias = "id_etudiant")]
    pub id: Option<i64>,
    #[serde(default, alias = "nom")]
    pub last_name: Option<String>,
    #[serde(default, alias = "prenom")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "telephone")]
    pub phone: Option<String>,
    #[serde(default, alias = "adresse")]
    pub address: Option<String>,
}

impl InsertStudentRequest {
    fn into_student(self) -> Option<NewStudent> {
        Some(NewStudent {
            id: self.id?,
            last_name: non_empty(self.last_name)?,
            first_name: non_empty(self.first_name)?,
            email: non_empty(self.email)?,
            phone: non_empty(self.phone),
            address: non_empty(self.address),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InsertGradeRequest {
    #[serde(default, alias = "id_etudiant")]
    pub student_id: Option<i64>,
    #[serde(default, alias = "id_matiere")]
    pub subject_id: Option<i64>,
    #[serde(default, alias = "note")]
    pub grade: Option<f64>,
    #[serde(default, alias = "date_evaluation")]
    pub evaluated_on: Option<NaiveDate>,
}

impl InsertGradeRequest {
    fn into_grade(self) -> Option<NewGrade> {
        Some(NewGrade {
            student_id: self.student_id?,
            subject_id: self.subject_id?,
            grade: self.grade?,
            evaluated_on: self.evaluated_on?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InsertBookRequest {
    #[serde(default, alias = "id_livre")]
    pub id: Option<i64>,
    #[serde(default, alias = "titre")]
    pub title: Option<String>,
    #[serde(default, alias = "auteur")]
    pub author: Option<String>,
    #[serde(default, alias = "categorie")]
    pub category: Option<String>,
}

impl InsertBookRequest {
    fn into_book(self) -> Option<NewBook> {
        Some(NewBook {
            id: self.id?,
            title: non_empty(self.title)?,
            author: non_empty(self.author)?,
            category: non_empty(self.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateLoanRequest {
    #[serde(default, alias = "id_etudiant")]
    pub student_id: Option<i64>,
    #[serde(default, alias = "id_livre")]
    pub book_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required<T>(value: Option<T>) -> Result<T, ApiError> {
    value.ok_or_else(|| bad_request(MISSING_FIELDS))
}

// ==================
// Admin Routes
// ==================

pub fn admin_routes(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/insert/student", post(insert_student_handler))
        .route("/insert/grade", post(insert_grade_handler))
        .route("/insert/book", post(insert_book_handler))
        .route("/create/loan", post(create_loan_handler))
        .route("/populate/sample", post(populate_handler))
        .route("/all-books", get(all_books_handler))
        .route("/all-loans", get(all_loans_handler))
        .with_state(gateway)
}

// ==================
// Insert Handlers
// ==================

async fn insert_student_handler(
    State(gateway): State<Arc<Gateway>>,
    payload: Result<Json<InsertStudentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Success<MessageResponse>>), ApiError> {
    let student = required(json_body(payload, MISSING_FIELDS)?.into_student())?;
    let message = format!("Student {} {} added", student.last_name, student.first_name);
    gateway
        .insert_student(student)
        .await
        .map_err(error_response)?;
    created(MessageResponse { message })
}

async fn insert_grade_handler(
    State(gateway): State<Arc<Gateway>>,
    payload: Result<Json<InsertGradeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Success<MessageResponse>>), ApiError> {
    let grade = required(json_body(payload, MISSING_FIELDS)?.into_grade())?;
    let message = format!("Grade {}/20 added for student {}", grade.grade, grade.student_id);
    gateway.insert_grade(grade).await.map_err(error_response)?;
    created(MessageResponse { message })
}

async fn insert_book_handler(
    State(gateway): State<Arc<Gateway>>,
    payload: Result<Json<InsertBookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Success<MessageResponse>>), ApiError> {
    let book = required(json_body(payload, MISSING_FIELDS)?.into_book())?;
    let message = format!("Book \"{}\" added", book.title);
    gateway.insert_book(book).await.map_err(error_response)?;
    created(MessageResponse { message })
}

async fn create_loan_handler(
    State(gateway): State<Arc<Gateway>>,
    payload: Result<Json<CreateLoanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Success<ReceiptResponse<LoanReceipt>>>), ApiError> {
    let request = json_body(payload, MISSING_FIELDS)?;
    let student_id = required(request.student_id)?;
    let book_id = required(request.book_id)?;
    let receipt = gateway
        .create_loan(student_id, book_id)
        .await
        .map_err(error_response)?;
    created(ReceiptResponse {
        message: format!("Loan created for student {} - book {}", student_id, book_id),
        receipt,
    })
}

fn created<T: Serialize>(body: T) -> Result<(StatusCode, Json<Success<T>>), ApiError> {
    let Json(envelope) = success(body)?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

// ==================
// Sample Data and Listing Handlers
// ==================

/// Always `200`; per-store outcomes live in `results`.
async fn populate_handler(State(gateway): State<Arc<Gateway>>) -> Json<Value> {
    Json(gateway.populate_sample().await.to_json())
}

async fn all_books_handler(State(gateway): State<Arc<Gateway>>) -> ApiResult<BooksResponse> {
    let books = gateway.all_books().await.map_err(error_response)?;
    success(BooksResponse { books })
}

async fn all_loans_handler(State(gateway): State<Arc<Gateway>>) -> ApiResult<LoansResponse> {
    let loans = gateway.all_loans().await.map_err(error_response)?;
    success(LoansResponse { loans })
}
