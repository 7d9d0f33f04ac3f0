use thiserror::Error;

/// Result type used across the gateway.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Every failure the gateway can report, classified so callers can decide
/// between "business outcome" and "system failure".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Unknown logical operation or dialect. Programming error, never retried.
    #[error("unsupported operation {operation}: {reason}")]
    UnsupportedOperation { operation: String, reason: String },

    /// The entity has no registered home backend.
    #[error("no backend registered for entity '{0}'")]
    UnknownEntity(String),

    /// A backend-addressed request named a backend that is not configured.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// The backend could not be reached or the pool gave up.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The resource is held by someone else (book already on loan).
    #[error("{0}")]
    ResourceUnavailable(String),

    /// The backend rejected a write.
    #[error("write rejected: {0}")]
    ConstraintViolation(String),

    /// Any other backend-side failure (syntax, permissions, type errors).
    #[error("query failed: {0}")]
    Query(String),

    /// The request carried values the operation cannot accept.
    #[error("{0}")]
    InvalidInput(String),

    /// A declared output column was missing from a result row.
    #[error("result row is missing column '{0}'")]
    MalformedRow(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind, exposed as the `error` field of responses.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::UnsupportedOperation { .. } => "unsupported_operation",
            GatewayError::UnknownEntity(_) => "unknown_entity",
            GatewayError::UnknownBackend(_) => "unknown_backend",
            GatewayError::Connection(_) => "connection",
            GatewayError::NotFound { .. } => "not_found",
            GatewayError::ResourceUnavailable(_) => "resource_unavailable",
            GatewayError::ConstraintViolation(_) => "constraint_violation",
            GatewayError::Query(_) => "query",
            GatewayError::InvalidInput(_) => "invalid_input",
            GatewayError::MalformedRow(_) => "malformed_row",
            GatewayError::Config(_) => "config",
        }
    }

    /// Business errors are expected outcomes of valid requests; everything
    /// else means the system or its configuration is at fault.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound { .. }
                | GatewayError::ResourceUnavailable(_)
                | GatewayError::ConstraintViolation(_)
                | GatewayError::InvalidInput(_)
                | GatewayError::UnknownBackend(_)
        )
    }
}
