use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid order number")]
    InvalidOrderNumber,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Order number was already submitted by another user")]
    OrderConflict,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Login is already taken")]
    UserExists,

    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Blocking task error: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    fn error_type(&self) -> &str {
        match self {
            LedgerError::InvalidOrderNumber => "validation_error",
            LedgerError::InvalidAmount(_) => "validation_error",
            LedgerError::BadRequest(_) => "bad_request",
            LedgerError::OrderConflict => "conflict",
            LedgerError::InsufficientFunds => "insufficient_funds",
            LedgerError::UserExists => "conflict",
            LedgerError::InvalidCredentials => "unauthorized",
            LedgerError::Unauthorized => "unauthorized",
            LedgerError::Database(_)
            | LedgerError::Pool(_)
            | LedgerError::Blocking(_)
            | LedgerError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::InvalidOrderNumber => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::InvalidAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            LedgerError::OrderConflict => StatusCode::CONFLICT,
            LedgerError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            LedgerError::UserExists => StatusCode::CONFLICT,
            LedgerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LedgerError::Unauthorized => StatusCode::UNAUTHORIZED,
            LedgerError::Database(_)
            | LedgerError::Pool(_)
            | LedgerError::Blocking(_)
            | LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        // internal failures are logged in full but collapse to one generic message
        let message = if status_code.is_server_error() {
            error!("{self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": message,
                "type": self.error_type()
            }
        }))
    }
}
