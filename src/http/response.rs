//! Response envelopes and error mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::GatewayError;

/// `{"status": "success", ...body}`.
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    pub status: &'static str,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
    pub error: &'static str,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

pub(crate) fn success<T: Serialize>(body: T) -> ApiResult<T> {
    Ok(Json(Success {
        status: "success",
        body,
    }))
}

/// HTTP status for each error kind.
pub(crate) fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::NotFound { .. } | GatewayError::UnknownBackend(_) => StatusCode::NOT_FOUND,
        GatewayError::ResourceUnavailable(_) | GatewayError::ConstraintViolation(_) => {
            StatusCode::CONFLICT
        }
        GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        GatewayError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Query(_) | GatewayError::MalformedRow(_) => StatusCode::BAD_GATEWAY,
        GatewayError::UnsupportedOperation { .. }
        | GatewayError::UnknownEntity(_)
        | GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: GatewayError) -> ApiError {
    let status = status_for(&err);
    if err.is_business() {
        tracing::debug!(error = %err, kind = err.kind(), "request refused");
    } else {
        tracing::error!(error = %err, kind = err.kind(), "request failed");
    }
    (
        status,
        Json(ErrorResponse {
            status: "error",
            message: err.to_string(),
            error: err.kind(),
        }),
    )
}

pub(crate) fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(GatewayError::InvalidInput(message.into()))
}

/// Unwrap a JSON body, reporting unreadable bodies with `message`.
pub(crate) fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    message: &str,
) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            tracing::debug!(rejection = %rejection.body_text(), "rejected request body");
            Err(bad_request(message))
        }
    }
}

/// Parse a required integer query parameter.
pub(crate) fn required_id(raw: Option<&str>, missing: &str) -> Result<i64, ApiError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    match raw {
        None => Err(bad_request(missing)),
        Some(value) => value
            .parse()
            .map_err(|_| bad_request(format!("'{}' is not a valid id", value))),
    }
}
