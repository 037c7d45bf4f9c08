use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::receipt::ReceiptStatus;

/// Structured validation failures raised by the receipt composer before any
/// network call is made. Line and lot indices are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum ReceiptValidationError {
    #[error("receipt has no lines")]
    EmptyReceipt,

    #[error("line {line}, lot {lot}: quantity and expiry date are both required")]
    IncompleteLot { line: usize, lot: usize },

    #[error("line {line}: lots sum to {lot_sum} but the declared total is {declared}")]
    LotMismatch {
        line: usize,
        declared: Decimal,
        lot_sum: Decimal,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    InvalidReceipt(#[from] ReceiptValidationError),

    #[error("a rejection reason is required")]
    MissingRejectionReason,

    #[error("a decision for receipt {0} is already in flight")]
    DecisionInFlight(i64),

    #[error("receipt {id} has already been decided ({status})")]
    AlreadyDecided { id: i64, status: ReceiptStatus },

    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("unknown role id: {0}")]
    UnknownRole(i16),

    #[error("backend error ({status}): {message}")]
    BackendError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Builds a backend error from an HTTP status and the raw message text
    /// returned by the server.
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        ServiceError::BackendError {
            status,
            message: message.into(),
        }
    }

    /// True for failures the caller can repair by correcting input locally.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ServiceError::ValidationError(_)
                | ServiceError::InvalidReceipt(_)
                | ServiceError::MissingRejectionReason
        )
    }

    /// True when the failure is an authorization denial rather than bad input
    /// or a transport problem.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            ServiceError::Unauthorized(_) | ServiceError::Forbidden(_)
        )
    }

    pub fn is_duplicate_reference(&self) -> bool {
        matches!(self, ServiceError::DuplicateReference(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn lot_mismatch_message_carries_both_totals() {
        let err = ReceiptValidationError::LotMismatch {
            line: 2,
            declared: dec!(100.00),
            lot_sum: dec!(99.50),
        };
        let msg = err.to_string();
        assert!(msg.contains("99.50"));
        assert!(msg.contains("100.00"));
    }

    #[test]
    fn validation_errors_are_classified_as_validation() {
        assert!(ServiceError::from(ReceiptValidationError::EmptyReceipt).is_validation());
        assert!(ServiceError::MissingRejectionReason.is_validation());
        assert!(!ServiceError::backend(500, "boom").is_validation());
    }

    #[test]
    fn authorization_classification() {
        assert!(ServiceError::Forbidden("no".into()).is_authorization());
        assert!(ServiceError::Unauthorized("expired".into()).is_authorization());
        assert!(!ServiceError::NotFound("receipt".into()).is_authorization());
    }

    #[test]
    fn duplicate_reference_is_distinguishable() {
        let err = ServiceError::DuplicateReference("G-001".into());
        assert!(err.is_duplicate_reference());
        assert!(!ServiceError::backend(409, "conflict").is_duplicate_reference());
    }
}
