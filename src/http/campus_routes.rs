//! Cross-store Routes
//!
//! Both endpoints answer `200` even when a store is down; failures show up
//! as `<field>_error` entries in the body.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::Value;

use super::response::{required_id, success, ApiResult};
use crate::gateway::Gateway;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub student_id: i64,
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct GraduationResponse {
    pub student_id: i64,
    pub checks: Value,
}

pub fn campus_routes(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/dashboard/:student_id", get(dashboard_handler))
        .route("/graduation/:student_id", get(graduation_handler))
        .with_state(gateway)
}

async fn dashboard_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(student_id): Path<String>,
) -> ApiResult<DashboardResponse> {
    let student_id = required_id(Some(&student_id), "Student ID required")?;
    let dashboard = gateway.dashboard(student_id).await;
    success(DashboardResponse {
        student_id,
        data: dashboard.to_json(),
    })
}

async fn graduation_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(student_id): Path<String>,
) -> ApiResult<GraduationResponse> {
    let student_id = required_id(Some(&student_id), "Student ID required")?;
    let report = gateway.graduation(student_id).await;
    success(GraduationResponse {
        student_id,
        checks: report.to_json(),
    })
}
