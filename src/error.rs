use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::role::Role;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection could not be taken from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The pool could not be built at startup.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A multipart error.
    #[error("Multipart error: {0}")]
    Multipart(String),

    /// The caller is authenticated but holds the wrong role.
    #[error("Access denied: requires {}, caller is {actual}", Role::describe_set(.required))]
    Forbidden {
        /// Roles that would have been accepted.
        required: Vec<Role>,
        /// The caller's role.
        actual: Role,
    },

    /// An area manager acted on a store outside their assignments.
    #[error("Store {0} is not assigned to the caller")]
    StoreNotAssigned(i32),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The identity provider rejected or failed a call.
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    /// A column expected in a result row was missing or had the wrong type.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::IdentityProvider(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "File system error".to_string())
            }

            AppError::Multipart(ref msg) => {
                tracing::warn!("Multipart error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Forbidden {
                ref required,
                actual,
            } => {
                tracing::warn!(
                    "Access denied: requires {}, caller is {}",
                    Role::describe_set(required),
                    actual
                );
                (
                    StatusCode::FORBIDDEN,
                    format!(
                        "Access denied. Required role: {}. Your role: {}",
                        Role::describe_set(required),
                        actual
                    ),
                )
            }

            AppError::StoreNotAssigned(store_id) => {
                tracing::warn!("Submission for unassigned store {}", store_id);
                (
                    StatusCode::FORBIDDEN,
                    "You are not assigned to this store".to_string(),
                )
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::IdentityProvider(ref msg) => {
                tracing::error!("Identity provider error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Identity provider error".to_string())
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing column in result row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        crate::handlers::response::error_json(status, &message)
    }
}
