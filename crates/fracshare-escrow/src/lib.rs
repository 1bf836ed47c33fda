//! # fracshare-escrow
//!
//! **Negotiated settlement**: buyer holds, two-sided confirmation,
//! reservations awaiting offline settlement, and the expiry sweeper.
//!
//! ## Architecture
//!
//! The escrow path runs beside the instant-buy path and mutates the same
//! order rows:
//! 1. **EscrowManager**: places holds, records confirmations, converts fully
//!    confirmed holds into reservations, and applies the administrator's
//!    settlement outcome
//! 2. **ExpirySweeper**: expires stale holds, reservations and orders, and
//!    prunes retired idempotency rows, on demand or on a tokio interval
//!
//! ## Hold Flow
//!
//! ```text
//! CreateBuyerHold → buyer + seller confirm → Reservation → AdminSettleReservation
//!                 ↘ cancel / expiry → shares back to the available pool
//! ```

pub mod escrow;
pub mod sweeper;

pub use escrow::{EscrowManager, HoldOutcome, ReservationSettlement, expire_hold, expire_reservation};
pub use sweeper::{ExpirySweeper, SweepReport, sweep_expired};
