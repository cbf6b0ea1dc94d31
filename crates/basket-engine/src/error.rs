//! # Engine Errors
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ValidationError ──► CoreError ─────────────┐                          │
//! │                                             ▼                          │
//! │  DbError::NotFound ─────────────────► EngineError::Core ──┐            │
//! │  ReservationError::InsufficientStock ──────┘               │            │
//! │                                                            ▼            │
//! │  DbError (anything else) ───────────► EngineError::Storage ──► ApiError │
//! │                                       (detail logged,        { code,   │
//! │                                        never displayed)        message }│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use basket_core::{CoreError, ValidationError};
use basket_db::{DbError, ReservationError};

/// Failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Business rule failure; safe to show.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failure. The source is kept for logging only.
    #[error("Storage operation failed")]
    Storage(#[source] DbError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::Core(CoreError::NotFound { entity, id }),
            other => EngineError::Storage(other),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<ReservationError> for EngineError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::InsufficientStock { product, requested } => {
                EngineError::Core(CoreError::InsufficientStock { product, requested })
            }
            ReservationError::Db(db) => db.into(),
        }
    }
}

impl EngineError {
    /// The business error, if this is one.
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(err) => Some(err),
            EngineError::Storage(_) => None,
        }
    }
}

// =============================================================================
// API Error
// =============================================================================

/// What an API layer hands back to its caller.
///
/// ```json
/// {
///   "code": "INAPPLICABLE_DISCOUNT",
///   "message": "Discount SAVE5 cannot be applied: usage limit reached"
/// }
/// ```
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Discount exists but does not apply (422)
    InapplicableDiscount,

    /// Checkout could not reserve stock (409)
    InsufficientStock,

    /// Checkout on an empty cart (422)
    EmptyCart,

    /// Anything the caller cannot act on (500)
    Internal,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match &err {
            CoreError::NotFound { .. } => ErrorCode::NotFound,
            CoreError::InapplicableDiscount { .. } => ErrorCode::InapplicableDiscount,
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::EmptyCart { .. } => ErrorCode::EmptyCart,
            CoreError::CartTooLarge { .. } | CoreError::Validation(_) => ErrorCode::ValidationError,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(core) => core.into(),
            EngineError::Storage(db) => {
                tracing::error!(error = %db, "Storage failure");
                ApiError::new(ErrorCode::Internal, "Internal error")
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
