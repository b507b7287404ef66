//! Unified error type for the bookstore inventory service.
//!
//! Every public operation returns [`Result`]. The first five variants form the
//! caller-visible taxonomy; the rest are ambient failures that are reported to
//! callers only as a generic internal error.

use sea_orm::DbErr;
use thiserror::Error;

/// Every failure a service operation can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any storage access
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Illegal state transition for the current order/transaction/invoice state
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Manual quantity set below zero
    #[error("Quantity cannot be negative: {quantity}")]
    NegativeQuantity { quantity: i64 },

    /// Referenced row does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Payment terminal returned a failing status or a malformed payload
    #[error("Payment terminal error: {message}")]
    ExternalService { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn external(message: impl Into<String>) -> Self {
        Self::ExternalService {
            message: message.into(),
        }
    }

    /// Whether the error belongs to the caller-visible taxonomy.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::BadRequest { .. }
                | Self::NegativeQuantity { .. }
                | Self::NotFound { .. }
                | Self::ExternalService { .. }
        )
    }

    /// HTTP-style status code reported at the API boundary.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::BadRequest { .. } | Self::NegativeQuantity { .. } => {
                400
            }
            Self::NotFound { .. } => 404,
            Self::ExternalService { .. }
            | Self::Config { .. }
            | Self::Database(_)
            | Self::Io(_) => 500,
        }
    }

    /// Stable error name reported at the API boundary.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::BadRequest { .. } => "BadRequestError",
            Self::NegativeQuantity { .. } => "NegativeQuantityError",
            Self::NotFound { .. } => "NotFoundError",
            Self::ExternalService { .. } => "ExternalServiceError",
            Self::Config { .. } | Self::Database(_) | Self::Io(_) => "InternalServerError",
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::validation("x").status(), 400);
        assert_eq!(Error::bad_request("x").status(), 400);
        assert_eq!(Error::NegativeQuantity { quantity: -1 }.status(), 400);
        assert_eq!(Error::not_found("Book", 1).status(), 404);
        assert_eq!(Error::external("down").status(), 500);
        assert_eq!(Error::Database(DbErr::Custom("boom".into())).status(), 500);
    }

    #[test]
    fn test_unknown_errors_are_not_known() {
        assert!(!Error::Database(DbErr::Custom("boom".into())).is_known());
        assert!(Error::external("down").is_known());
        assert_eq!(
            Error::Config {
                message: "bad".into()
            }
            .name(),
            "InternalServerError"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("Order", "20260101-7");
        assert_eq!(err.to_string(), "Order not found: 20260101-7");
    }
}
