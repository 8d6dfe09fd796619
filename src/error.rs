//! Billing Error Types
//!
//! Every fallible core operation returns a typed [`BillingError`]; callers
//! (API controllers) translate these into user-facing responses via
//! [`BillingError::code`] and [`BillingError::http_status`].

use thiserror::Error;

use crate::core_types::AccountId;

/// Billing error taxonomy
///
/// Error codes are stable strings for consistent API responses.
#[derive(Error, Debug, Clone)]
pub enum BillingError {
    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Commission percentage out of range: {0}")]
    InvalidCommission(u8),

    #[error("Elapsed duration must be positive")]
    InvalidDuration,

    #[error("Payer and payee cannot be the same account")]
    SameAccount,

    // === Balance Errors ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    // === Availability Errors ===
    #[error("Payee is not accepting sessions")]
    PayeeUnavailable,

    #[error("Account is deactivated")]
    AccountDeactivated,

    // === State Errors ===
    #[error("Session is not active")]
    SessionNotActive,

    #[error("Already processed")]
    AlreadyProcessed,

    #[error("Payee has no verified payout destination")]
    MissingPayoutDetails,

    // === Idempotency Errors ===
    #[error("Duplicate transaction reference: {0}")]
    DuplicateReference(String),

    // === Lookup Errors ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(String),

    #[error("Gift not found: {0}")]
    GiftNotFound(String),

    #[error("Gift is not available: {0}")]
    GiftUnavailable(String),

    // === System Errors ===
    #[error("Store error: {0}")]
    Store(String),
}

impl BillingError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::InvalidAmount => "INVALID_AMOUNT",
            BillingError::InvalidCommission(_) => "INVALID_COMMISSION",
            BillingError::InvalidDuration => "INVALID_DURATION",
            BillingError::SameAccount => "SAME_ACCOUNT",
            BillingError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            BillingError::PayeeUnavailable => "PAYEE_UNAVAILABLE",
            BillingError::AccountDeactivated => "ACCOUNT_DEACTIVATED",
            BillingError::SessionNotActive => "SESSION_NOT_ACTIVE",
            BillingError::AlreadyProcessed => "ALREADY_PROCESSED",
            BillingError::MissingPayoutDetails => "MISSING_PAYOUT_DETAILS",
            BillingError::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            BillingError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            BillingError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            BillingError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            BillingError::WithdrawalNotFound(_) => "WITHDRAWAL_NOT_FOUND",
            BillingError::GiftNotFound(_) => "GIFT_NOT_FOUND",
            BillingError::GiftUnavailable(_) => "GIFT_UNAVAILABLE",
            BillingError::Store(_) => "STORE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            BillingError::InvalidAmount
            | BillingError::InvalidCommission(_)
            | BillingError::InvalidDuration
            | BillingError::SameAccount
            | BillingError::DuplicateReference(_) => 400,
            BillingError::InsufficientBalance
            | BillingError::PayeeUnavailable
            | BillingError::AccountDeactivated
            | BillingError::SessionNotActive
            | BillingError::AlreadyProcessed
            | BillingError::MissingPayoutDetails
            | BillingError::GiftUnavailable(_) => 422,
            BillingError::AccountNotFound(_)
            | BillingError::SessionNotFound(_)
            | BillingError::TransactionNotFound(_)
            | BillingError::WithdrawalNotFound(_)
            | BillingError::GiftNotFound(_) => 404,
            BillingError::Store(_) => 500,
        }
    }

    /// Whether retrying the same request can succeed.
    ///
    /// Store errors are transient; validation and state errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Store(_))
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BillingError::InsufficientBalance.code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(BillingError::SessionNotActive.code(), "SESSION_NOT_ACTIVE");
        assert_eq!(
            BillingError::DuplicateReference("r1".into()).code(),
            "DUPLICATE_REFERENCE"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(BillingError::InvalidAmount.http_status(), 400);
        assert_eq!(BillingError::InsufficientBalance.http_status(), 422);
        assert_eq!(BillingError::AccountNotFound(7).http_status(), 404);
        assert_eq!(BillingError::Store("down".into()).http_status(), 500);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BillingError::InsufficientBalance.to_string(),
            "Insufficient balance"
        );
        assert_eq!(
            BillingError::InvalidCommission(101).to_string(),
            "Commission percentage out of range: 101"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(BillingError::Store("timeout".into()).is_retryable());
        assert!(!BillingError::InsufficientBalance.is_retryable());
    }
}
