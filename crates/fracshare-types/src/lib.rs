//! # fracshare-types
//!
//! Shared types, errors, and configuration for the **FracShare** trading core.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`UserId`], [`PropertyId`], [`HoldId`], [`ReservationId`], [`TradeId`], [`TransactionToken`]
//! - **Order model**: [`SellOrder`], [`OrderStatus`]
//! - **Hold model**: [`BuyerHold`], [`HoldStatus`], [`Party`]
//! - **Reservation model**: [`Reservation`], [`ReservationStatus`]
//! - **Trade model**: [`Trade`], [`TradeSource`], [`FeeSplit`], [`SettlementReceipt`]
//! - **Idempotency model**: [`IdempotencyEntry`], [`IdempotencyState`], [`RequestFingerprint`]
//! - **Configuration**: [`TradingConfig`]
//! - **Errors**: [`FracshareError`] with `FS_ERR_` prefix codes, [`ErrorKind`], [`ErrorResponse`]
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod hold;
pub mod idempotency;
pub mod ids;
pub mod order;
pub mod reservation;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use fracshare_types::{SellOrder, BuyerHold, Trade, ...};

pub use config::*;
pub use error::*;
pub use hold::*;
pub use idempotency::*;
pub use ids::*;
pub use order::*;
pub use reservation::*;
pub use trade::*;

// Constants are accessed via `fracshare_types::constants::FOO`
// (not re-exported to avoid name collisions).
