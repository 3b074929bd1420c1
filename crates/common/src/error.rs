//! Service-level error taxonomy.

use thiserror::Error;

/// Coarse error class, mirrored onto HTTP status codes at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

/// Errors reported by the offer, shipment and post services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Malformed input or an illegal state transition.
    #[error("{0}")]
    BadRequest(String),

    /// Missing row, offer or shipment.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate create.
    #[error("{0}")]
    Conflict(String),

    /// Storage, bus or cache failure.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Translates a storage error, logging anything that is not a plain miss.
    ///
    /// `RowNotFound` becomes `NotFound` with `missing` as message; unique
    /// violations become `Conflict`; everything else becomes `Internal`.
    pub fn database(context: &str, missing: impl Into<String>, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound(missing.into()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                tracing::warn!(error = %err, context, "duplicate row");
                AppError::Conflict(format!("{context}: already exists"))
            }
            other => {
                tracing::error!(error = %other, context, "database error");
                AppError::Internal("Unexpected database error".to_string())
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::Internal(m) => m,
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, AppError>;
