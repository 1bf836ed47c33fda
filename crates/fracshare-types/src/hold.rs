//! # Buyer holds: the two-sided confirmation primitive
//!
//! A [`BuyerHold`] provisionally takes shares out of an order's available
//! pool while buyer and seller confirm the trade.
//!
//! ## State Machine
//!
//! ```text
//!   ACTIVE ──buyer confirms──▶ BUYER_CONFIRMED ──seller confirms──┐
//!     │                                                          ▼
//!     └────seller confirms──▶ SELLER_CONFIRMED ──buyer confirms─▶ BOTH_CONFIRMED
//!                                                                  │ convert
//!   pending ──cancel──▶ RELEASED ◀─────────────────────────────────┘
//!   pending ──expiry──▶ EXPIRED
//! ```
//!
//! Transitions are monotonic; RELEASED and EXPIRED are terminal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{FracshareError, HoldId, OrderId, PropertyId, ReservationId, Result, SellOrder, UserId};

/// Lifecycle state of a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    BuyerConfirmed,
    SellerConfirmed,
    BothConfirmed,
    Released,
    Expired,
}

impl HoldStatus {
    /// Still holding shares and awaiting a confirmation.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::Active | Self::BuyerConfirmed | Self::SellerConfirmed
        )
    }

    /// Can this hold transition to the given target state?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Active, Self::BuyerConfirmed | Self::SellerConfirmed)
            | (Self::BuyerConfirmed | Self::SellerConfirmed, Self::BothConfirmed)
            | (Self::BothConfirmed, Self::Released) => true,
            (from, Self::Released | Self::Expired) => from.is_pending(),
            _ => false,
        }
    }
}

impl std::fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::BuyerConfirmed => write!(f, "BUYER_CONFIRMED"),
            Self::SellerConfirmed => write!(f, "SELLER_CONFIRMED"),
            Self::BothConfirmed => write!(f, "BOTH_CONFIRMED"),
            Self::Released => write!(f, "RELEASED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Which party is confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Buyer,
    Seller,
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Seller => write!(f, "seller"),
        }
    }
}

/// Shares provisionally held for one buyer against one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerHold {
    pub id: HoldId,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub property_id: PropertyId,
    pub shares: u64,
    /// The order's ask at the time the hold was placed.
    pub price_per_share: Decimal,
    pub status: HoldStatus,
    pub buyer_confirmed: bool,
    pub seller_confirmed: bool,
    /// Stage-specific deadline; moves forward after the first confirmation.
    pub expires_at: DateTime<Utc>,
    /// Set once the hold has been converted.
    pub reservation_id: Option<ReservationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BuyerHold {
    /// A fresh hold on `shares` of `order` at its current ask.
    #[must_use]
    pub fn new(
        order: &SellOrder,
        buyer_id: UserId,
        shares: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HoldId::new(),
            order_id: order.id,
            buyer_id,
            seller_id: order.seller_id,
            property_id: order.property_id,
            shares,
            price_per_share: order.ask_price,
            status: HoldStatus::Active,
            buyer_confirmed: false,
            seller_confirmed: false,
            expires_at,
            reservation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Which party `user` is on this hold, if any.
    #[must_use]
    pub fn party_of(&self, user: UserId) -> Option<Party> {
        if user == self.buyer_id {
            Some(Party::Buyer)
        } else if user == self.seller_id {
            Some(Party::Seller)
        } else {
            None
        }
    }

    /// Record one side's confirmation. Returns `true` once both sides have
    /// confirmed (status BOTH_CONFIRMED); otherwise the expiry moves to
    /// `next_deadline`.
    pub fn confirm(
        &mut self,
        party: Party,
        next_deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let already = match party {
            Party::Buyer => self.buyer_confirmed,
            Party::Seller => self.seller_confirmed,
        };
        if already || !self.status.is_pending() {
            return Err(FracshareError::StateConflict {
                reason: format!(
                    "{} cannot confirm hold {} in state {}",
                    party, self.id, self.status
                ),
            });
        }
        match party {
            Party::Buyer => self.buyer_confirmed = true,
            Party::Seller => self.seller_confirmed = true,
        }
        let target = if self.buyer_confirmed && self.seller_confirmed {
            HoldStatus::BothConfirmed
        } else {
            match party {
                Party::Buyer => HoldStatus::BuyerConfirmed,
                Party::Seller => HoldStatus::SellerConfirmed,
            }
        };
        self.transition(target, now)?;
        if target != HoldStatus::BothConfirmed {
            self.expires_at = next_deadline;
        }
        Ok(target == HoldStatus::BothConfirmed)
    }

    /// BOTH_CONFIRMED → RELEASED, remembering the reservation it became.
    pub fn mark_converted(&mut self, reservation_id: ReservationId, now: DateTime<Utc>) -> Result<()> {
        if self.status != HoldStatus::BothConfirmed {
            return Err(self.conflict(HoldStatus::Released));
        }
        self.transition(HoldStatus::Released, now)?;
        self.reservation_id = Some(reservation_id);
        Ok(())
    }

    /// Pending → RELEASED (cancellation).
    pub fn mark_released(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_pending() {
            return Err(self.conflict(HoldStatus::Released));
        }
        self.transition(HoldStatus::Released, now)
    }

    /// Pending → EXPIRED.
    pub fn mark_expired(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(HoldStatus::Expired, now)
    }

    fn transition(&mut self, target: HoldStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(self.conflict(target));
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    fn conflict(&self, target: HoldStatus) -> FracshareError {
        FracshareError::StateConflict {
            reason: format!(
                "cannot transition hold {} from {} to {}",
                self.id, self.status, target
            ),
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl BuyerHold {
    pub fn dummy(shares: u64, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: HoldId::new(),
            order_id: OrderId::new(),
            buyer_id: UserId::new(),
            seller_id: UserId::new(),
            property_id: PropertyId::new(),
            shares,
            price_per_share: Decimal::new(100, 0),
            status: HoldStatus::Active,
            buyer_confirmed: false,
            seller_confirmed: false,
            expires_at: now + ttl,
            reservation_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
