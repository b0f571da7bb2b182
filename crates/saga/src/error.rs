//! Saga error types.

use common::{AccountId, Money, OrderId, ProductId};
use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur during saga operations.
///
/// Every variant carries owned data only, so errors can be stored in a
/// [`SagaOutcome`](crate::SagaOutcome) and replayed for a retried request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// The request was malformed; no remote call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A product id could not be resolved by the product service.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The account has no wallet.
    #[error("Wallet not found for account {0}")]
    WalletNotFound(AccountId),

    /// The order service has no such order.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The wallet balance is below the order total.
    #[error("Insufficient funds: order total is {required}, balance is {available}")]
    InsufficientFunds { required: Money, available: Money },

    /// The wallet service refused a debit for a reason other than funds.
    #[error("Debit declined: {0}")]
    DebitDeclined(String),

    /// The order service rejected the order as invalid.
    #[error("Order rejected by order service: {0}")]
    OrderRejected(String),

    /// Transport failure or timeout talking to a dependency.
    #[error("{service} service unavailable: {reason}")]
    RemoteUnavailable { service: String, reason: String },

    /// A debit was sent but no answer came back; the wallet may have been charged.
    #[error("Debit outcome unknown: {reason}")]
    DebitOutcomeUnknown { reason: String },

    /// The inbound request was cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// Summing prices overflowed the monetary type.
    #[error("Order total overflows the monetary range")]
    AmountOverflow,

    /// The compensating credit failed after a successful debit.
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// Saga attempted an illegal state transition.
    #[error("Invalid saga transition from {from} to {to}")]
    InvalidState { from: SagaState, to: SagaState },

    /// A request with the same idempotency key is still executing.
    #[error("Request with idempotency key '{0}' is already in progress")]
    DuplicateRequest(String),

    /// Unexpected internal failure (e.g. the saga task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SagaError {
    /// Builds a `RemoteUnavailable` error for the named service.
    pub fn unavailable(service: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        SagaError::RemoteUnavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for errors that mean a dependency could not be reached.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SagaError::RemoteUnavailable { .. } | SagaError::Cancelled
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
