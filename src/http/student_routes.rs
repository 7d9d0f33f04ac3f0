//! Backend-addressed Routes
//!
//! Reads against one named backend, echoing the SQL that was run.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use super::response::{bad_request, error_response, required_id, success, ApiResult};
use crate::gateway::Gateway;
use crate::ops::{EnrollmentCheck, EnrollmentStats, Listing, Single};

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub message: String,
    pub driver: &'static str,
}

// ==================
// Student Routes
// ==================

pub fn student_routes(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/connect/:backend", get(connect_handler))
        .route("/query/:backend", get(probe_handler))
        .route("/student/enrollment/:backend", get(enrollment_handler))
        .route("/student/details/:backend", get(details_handler))
        .route("/student/grades/:backend", get(grades_handler))
        .route("/student/search/:backend", get(search_handler))
        .route("/stats/enrollment/:backend", get(stats_handler))
        .with_state(gateway)
}

// ==================
// Handlers
// ==================

async fn connect_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(backend): Path<String>,
) -> ApiResult<ConnectResponse> {
    let driver = gateway.connect(&backend).await.map_err(error_response)?;
    success(ConnectResponse {
        message: format!("Connected to {}", backend.to_uppercase()),
        driver,
    })
}

async fn probe_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(backend): Path<String>,
) -> ApiResult<Listing> {
    success(gateway.probe(&backend).await.map_err(error_response)?)
}

async fn enrollment_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(backend): Path<String>,
    Query(query): Query<IdQuery>,
) -> ApiResult<EnrollmentCheck> {
    let id = required_id(query.id.as_deref(), "Student ID required")?;
    success(
        gateway
            .enrollment_check(&backend, id)
            .await
            .map_err(error_response)?,
    )
}

async fn details_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(backend): Path<String>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Single> {
    let id = required_id(query.id.as_deref(), "Student ID required")?;
    success(
        gateway
            .student_details(&backend, id)
            .await
            .map_err(error_response)?,
    )
}

async fn grades_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(backend): Path<String>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Listing> {
    let id = required_id(query.id.as_deref(), "Student ID required")?;
    success(
        gateway
            .student_grades(&backend, id)
            .await
            .map_err(error_response)?,
    )
}

async fn search_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(backend): Path<String>,
    Query(query): Query<NameQuery>,
) -> ApiResult<Listing> {
    let name = query
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| bad_request("Name required"))?;
    success(
        gateway
            .search_students(&backend, name.trim())
            .await
            .map_err(error_response)?,
    )
}

async fn stats_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(backend): Path<String>,
) -> ApiResult<EnrollmentStats> {
    success(
        gateway
            .enrollment_stats(&backend)
            .await
            .map_err(error_response)?,
    )
}
