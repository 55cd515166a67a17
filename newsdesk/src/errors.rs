use crate::db::errors::DbError;
use crate::types::{Operation, Resource};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Login attempt with an unknown username or a wrong password. Both cases share this
    /// variant so the response does not reveal which one occurred.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// User lacks required permissions for the operation
    #[error("Insufficient permissions to {action} {resource}")]
    InsufficientPermissions { action: Operation, resource: Resource },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Storage operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Conflict error, e.g. a username that is already taken
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl Error {
    /// A username clash reported by an account store, or the storage error unchanged
    pub fn from_account_write(err: DbError) -> Self {
        if err.is_username_conflict() {
            Error::Conflict {
                message: "This username is already taken".to_string(),
            }
        } else {
            Error::Database(err)
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } | Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InvalidCredentials => "Invalid username or password".to_string(),
            Error::InsufficientPermissions { action, resource } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => unique_violation_message(db_err).0,
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Conflict { message } => message.clone(),
        }
    }
}

/// User-facing message and resource name for a unique constraint violation
fn unique_violation_message(err: &DbError) -> (String, &'static str) {
    match err {
        DbError::UniqueViolation { table, constraint, .. } => match (table.as_deref(), constraint.as_deref()) {
            (Some("users"), Some(c)) if c.contains("username") => ("This username is already taken".to_string(), "user"),
            _ => ("Resource already exists".to_string(), "unknown"),
        },
        _ => ("Resource already exists".to_string(), "unknown"),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InvalidCredentials | Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::Conflict { message } => (status, axum::response::Json(json!({ "message": message }))).into_response(),
            // Unique violations get a minimal structured body naming the resource
            Error::Database(db_err @ DbError::UniqueViolation { .. }) => {
                let (message, resource) = unique_violation_message(db_err);
                let body = json!({
                    "message": message,
                    "resource": resource
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Unauthenticated { message: None }.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::InsufficientPermissions {
                action: Operation::UpdateAll,
                resource: Resource::Users,
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::Database(DbError::username_taken("bob")).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Database(DbError::Other(anyhow::anyhow!("connection reset"))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_errors_do_not_leak_details() {
        let err = Error::Database(DbError::Other(anyhow::anyhow!("password authentication failed for user postgres")));
        assert_eq!(err.user_message(), "Database error occurred");
    }

    #[test]
    fn test_account_write_conflicts_become_conflict_errors() {
        let err = Error::from_account_write(DbError::username_taken("bob"));
        assert!(matches!(&err, Error::Conflict { message } if message == "This username is already taken"));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = Error::from_account_write(DbError::NotFound);
        assert!(matches!(err, Error::Database(DbError::NotFound)));
    }

    #[test]
    fn test_username_conflict_message() {
        let err = Error::Database(DbError::username_taken("bob"));
        assert_eq!(err.user_message(), "This username is already taken");
    }
}
