//! Error types for the FracShare trading core.
//!
//! All errors use the `FS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Ledger / balance errors
//! - 3xx: Hold / reservation errors
//! - 4xx: Idempotency errors
//! - 9xx: General / internal errors
//!
//! Nothing crosses the API boundary as a panic or a bare string: callers
//! turn a [`FracshareError`] into an [`ErrorResponse`] carrying the wire
//! code, the error kind, a human message and optional structured details.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{HoldId, OrderId, OrderStatus, PropertyId, ReservationId, TransactionToken};

/// Central error enum for all FracShare operations.
#[derive(Debug, Error)]
pub enum FracshareError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The requested sell order does not exist.
    #[error("FS_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The request carried an unusable share count, price or expiry.
    #[error("FS_ERR_101: Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The order is not in a state that accepts buys or holds.
    #[error("FS_ERR_102: Order {order_id} is not active (status {status})")]
    OrderInactive { order_id: OrderId, status: OrderStatus },

    /// Fewer shares are available than requested.
    #[error("FS_ERR_103: Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: u64, available: u64 },

    /// Buyer and seller are the same user.
    #[error("FS_ERR_104: Self-trade forbidden: buyer owns the order")]
    SelfTrade,

    /// Trading is switched off for the property.
    #[error("FS_ERR_105: Trading disabled for property {0}")]
    TradingDisabled(PropertyId),

    /// The caller is not a party allowed to act on this resource.
    #[error("FS_ERR_106: Not a participant: {reason}")]
    NotParticipant { reason: String },

    // =================================================================
    // Ledger Errors (2xx)
    // =================================================================
    /// Not enough wallet balance to pay for the trade.
    #[error("FS_ERR_200: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// A wallet write would produce a negative value.
    #[error("FS_ERR_201: Balance underflow")]
    BalanceUnderflow,

    /// A share-ownership write would produce a negative value.
    #[error("FS_ERR_202: Share ownership underflow")]
    ShareUnderflow,

    /// Conservation of cash or shares no longer holds. Critical.
    #[error("FS_ERR_203: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // Hold / Reservation Errors (3xx)
    // =================================================================
    /// The hold does not exist.
    #[error("FS_ERR_300: Hold not found: {0}")]
    HoldNotFound(HoldId),

    /// The reservation does not exist.
    #[error("FS_ERR_301: Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// A hold/reservation/order state machine step was attempted from the wrong state.
    #[error("FS_ERR_302: State conflict: {reason}")]
    StateConflict { reason: String },

    /// The hold's confirmation window has passed.
    #[error("FS_ERR_303: Hold expired: {0}")]
    HoldExpired(HoldId),

    /// The reservation's settlement window has passed.
    #[error("FS_ERR_304: Reservation expired: {0}")]
    ReservationExpired(ReservationId),

    // =================================================================
    // Idempotency Errors (4xx)
    // =================================================================
    /// The token was already used for a different request.
    #[error("FS_ERR_400: Duplicate transaction token: {0}")]
    DuplicateTransaction(TransactionToken),

    /// Another request with this token is still being processed.
    #[error("FS_ERR_401: Concurrent transaction in flight for token: {0}")]
    ConcurrentTransaction(TransactionToken),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("FS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("FS_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, out-of-range values, etc.).
    #[error("FS_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("FS_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, FracshareError>;

impl From<std::io::Error> for FracshareError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FracshareError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientFunds,
    InsufficientInventory,
    SelfTradeForbidden,
    ResourceInactive,
    FeatureDisabled,
    DuplicateRequest,
    ConcurrentConflict,
    StateConflict,
    Expired,
    Internal,
}

impl FracshareError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } | Self::NotParticipant { .. } => ErrorKind::Validation,
            Self::OrderNotFound(_) | Self::HoldNotFound(_) | Self::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientFunds,
            Self::InsufficientShares { .. } => ErrorKind::InsufficientInventory,
            Self::SelfTrade => ErrorKind::SelfTradeForbidden,
            Self::OrderInactive { .. } => ErrorKind::ResourceInactive,
            Self::TradingDisabled(_) => ErrorKind::FeatureDisabled,
            Self::DuplicateTransaction(_) => ErrorKind::DuplicateRequest,
            Self::ConcurrentTransaction(_) => ErrorKind::ConcurrentConflict,
            Self::StateConflict { .. } => ErrorKind::StateConflict,
            Self::HoldExpired(_) | Self::ReservationExpired(_) => ErrorKind::Expired,
            Self::BalanceUnderflow
            | Self::ShareUnderflow
            | Self::SupplyInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Stable wire code for the operation contract.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::OrderInactive { .. } => "ORDER_INACTIVE",
            Self::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            Self::SelfTrade => "SELF_TRADE",
            Self::TradingDisabled(_) => "TRADING_DISABLED",
            Self::NotParticipant { .. } => "NOT_PARTICIPANT",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::HoldNotFound(_) => "HOLD_NOT_FOUND",
            Self::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            Self::StateConflict { .. } => "STATE_CONFLICT",
            Self::HoldExpired(_) | Self::ReservationExpired(_) => "EXPIRED",
            Self::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            Self::ConcurrentTransaction(_) => "CONCURRENT_TRANSACTION",
            Self::BalanceUnderflow
            | Self::ShareUnderflow
            | Self::SupplyInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => "INTERNAL",
        }
    }

    /// Message suitable for showing to the end user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::OrderNotFound(_) => "This listing no longer exists",
            Self::InvalidRequest { .. } => "The request is invalid",
            Self::OrderInactive { .. } => "This listing is no longer available",
            Self::InsufficientShares { .. } => "Not enough shares available",
            Self::SelfTrade => "You cannot buy from your own order",
            Self::TradingDisabled(_) => "Trading is currently disabled for this property",
            Self::NotParticipant { .. } => "You are not a party to this trade",
            Self::InsufficientBalance { .. } => "Insufficient wallet balance",
            Self::HoldNotFound(_) => "This hold no longer exists",
            Self::ReservationNotFound(_) => "This reservation no longer exists",
            Self::StateConflict { .. } => "This request was already handled or is no longer valid",
            Self::HoldExpired(_) => "The hold has expired",
            Self::ReservationExpired(_) => "The reservation has expired",
            Self::DuplicateTransaction(_) => "This transaction was already submitted",
            Self::ConcurrentTransaction(_) => "This transaction is already being processed",
            Self::BalanceUnderflow
            | Self::ShareUnderflow
            | Self::SupplyInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => "Something went wrong, please try again later",
        }
    }

    /// Machine-readable details for errors that carry numbers.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientShares {
                requested,
                available,
            } => Some(serde_json::json!({
                "requested": requested,
                "available": available,
            })),
            Self::InsufficientBalance { needed, available } => Some(serde_json::json!({
                "needed": needed.to_string(),
                "available": available.to_string(),
            })),
            Self::OrderInactive { order_id, status } => Some(serde_json::json!({
                "order_id": order_id.to_string(),
                "status": status.to_string(),
            })),
            _ => None,
        }
    }

    /// Structured form returned across the API boundary.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            kind: self.kind(),
            message: self.user_message().to_string(),
            detail: self.to_string(),
            details: self.details(),
        }
    }
}

/// Structured error result: code + human message + optional details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub kind: ErrorKind,
    /// User-facing message.
    pub message: String,
    /// Operator-facing message with the `FS_ERR_` prefix.
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
