//! Reservations: fully confirmed holds awaiting final settlement.
//!
//! ```text
//!   ┌────────┐  admin settles (success)  ┌───────────┐
//!   │ ACTIVE ├──────────────────────────▶│ COMPLETED │
//!   └───┬────┘                           └───────────┘
//!       │ admin settles (failure) → CANCELLED
//!       │ past expires_at          → EXPIRED
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    BuyerHold, FracshareError, HoldId, OrderId, PropertyId, ReservationId, Result, TradeId, UserId,
};

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    /// Only ACTIVE can move, and only to a terminal state.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Active, Self::Completed | Self::Cancelled | Self::Expired)
        )
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A confirmed trade awaiting offline settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub hold_id: HoldId,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub property_id: PropertyId,
    pub shares: u64,
    pub price_per_share: Decimal,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub admin_notes: Option<String>,
    /// The trade that settled this reservation.
    pub trade_id: Option<TradeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Build the reservation a fully confirmed hold turns into.
    #[must_use]
    pub fn from_hold(hold: &BuyerHold, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::new(),
            hold_id: hold.id,
            order_id: hold.order_id,
            buyer_id: hold.buyer_id,
            seller_id: hold.seller_id,
            property_id: hold.property_id,
            shares: hold.shares,
            price_per_share: hold.price_per_share,
            status: ReservationStatus::Active,
            expires_at,
            admin_notes: None,
            trade_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Gross amount the buyer pays on settlement.
    #[must_use]
    pub fn gross_amount(&self) -> Decimal {
        self.price_per_share * Decimal::from(self.shares)
    }

    /// ACTIVE → COMPLETED.
    pub fn mark_completed(&mut self, trade_id: TradeId, now: DateTime<Utc>) -> Result<()> {
        self.transition(ReservationStatus::Completed, now)?;
        self.trade_id = Some(trade_id);
        Ok(())
    }

    /// ACTIVE → CANCELLED.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(ReservationStatus::Cancelled, now)
    }

    /// ACTIVE → EXPIRED.
    pub fn mark_expired(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(ReservationStatus::Expired, now)
    }

    fn transition(&mut self, target: ReservationStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(FracshareError::StateConflict {
                reason: format!(
                    "cannot transition reservation {} from {} to {}",
                    self.id, self.status, target
                ),
            });
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }
}
