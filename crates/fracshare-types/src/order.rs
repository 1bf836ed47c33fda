//! Sell order model.
//!
//! A [`SellOrder`] is a seller's standing offer of up to `total_shares` of
//! one property at a fixed `ask_price`. Its sellable pool is split three
//! ways:
//!
//! ```text
//!   remaining_shares = available + held_shares + reserved_shares
//! ```
//!
//! `held_shares` belong to active buyer holds, `reserved_shares` to active
//! reservations. Neither leaves `remaining_shares` until the trade settles
//! or the hold/reservation is released.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{FracshareError, OrderId, PropertyId, Result, UserId};

/// Lifecycle status of a sell order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Shares available for instant buys and new holds.
    Active,
    /// Every remaining share is under a buyer hold.
    Reserved,
    /// Nothing available; some shares await offline settlement of a reservation.
    AwaitingOfflineSettlement,
    /// All shares sold.
    Completed,
    /// Withdrawn by the seller.
    Cancelled,
    /// Past `expires_at`.
    Expired,
}

impl OrderStatus {
    /// Not yet terminal.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(
            self,
            Self::Active | Self::Reserved | Self::AwaitingOfflineSettlement
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Reserved => write!(f, "RESERVED"),
            Self::AwaitingOfflineSettlement => write!(f, "AWAITING_OFFLINE_SETTLEMENT"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A seller's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrder {
    pub id: OrderId,
    pub seller_id: UserId,
    pub property_id: PropertyId,
    pub total_shares: u64,
    /// Never increases.
    pub remaining_shares: u64,
    /// Shares under active buyer holds.
    pub held_shares: u64,
    /// Shares committed to active reservations.
    pub reserved_shares: u64,
    /// Price per share, fixed at listing.
    pub ask_price: Decimal,
    pub status: OrderStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellOrder {
    /// A fresh listing with every share available.
    #[must_use]
    pub fn new(
        seller_id: UserId,
        property_id: PropertyId,
        shares: u64,
        ask_price: Decimal,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            seller_id,
            property_id,
            total_shares: shares,
            remaining_shares: shares,
            held_shares: 0,
            reserved_shares: 0,
            ask_price,
            status: OrderStatus::Active,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shares not under any hold or reservation.
    #[must_use]
    pub fn available_shares(&self) -> u64 {
        self.remaining_shares
            .saturating_sub(self.held_shares)
            .saturating_sub(self.reserved_shares)
    }

    /// Shares sold so far.
    #[must_use]
    pub fn sold_shares(&self) -> u64 {
        self.total_shares - self.remaining_shares
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Gross cost of `shares` at the ask price.
    pub fn cost_of(&self, shares: u64) -> Result<Decimal> {
        trade_value(self.ask_price, shares)
    }

    /// Error unless the order is `Active`.
    pub fn ensure_active(&self) -> Result<()> {
        if self.status == OrderStatus::Active {
            Ok(())
        } else {
            Err(FracshareError::OrderInactive {
                order_id: self.id,
                status: self.status,
            })
        }
    }

    /// Error unless `shares` is positive and fits the available pool.
    pub fn ensure_available(&self, shares: u64) -> Result<()> {
        if shares == 0 {
            return Err(FracshareError::InvalidRequest {
                reason: "shares must be greater than zero".to_string(),
            });
        }
        let available = self.available_shares();
        if shares > available {
            return Err(FracshareError::InsufficientShares {
                requested: shares,
                available,
            });
        }
        Ok(())
    }

    /// Move `shares` from the available pool under a hold.
    pub fn place_hold(&mut self, shares: u64, now: DateTime<Utc>) -> Result<()> {
        self.ensure_available(shares)?;
        self.held_shares += shares;
        self.touch(now);
        Ok(())
    }

    /// Return held shares to the available pool.
    pub fn release_hold(&mut self, shares: u64, now: DateTime<Utc>) -> Result<()> {
        self.held_shares = self
            .held_shares
            .checked_sub(shares)
            .ok_or(FracshareError::ShareUnderflow)?;
        self.touch(now);
        Ok(())
    }

    /// A fully confirmed hold becomes a reservation: held → reserved.
    pub fn convert_hold(&mut self, shares: u64, now: DateTime<Utc>) -> Result<()> {
        self.held_shares = self
            .held_shares
            .checked_sub(shares)
            .ok_or(FracshareError::ShareUnderflow)?;
        self.reserved_shares += shares;
        self.touch(now);
        Ok(())
    }

    /// Return reserved shares to the available pool.
    pub fn release_reservation(&mut self, shares: u64, now: DateTime<Utc>) -> Result<()> {
        self.reserved_shares = self
            .reserved_shares
            .checked_sub(shares)
            .ok_or(FracshareError::ShareUnderflow)?;
        self.touch(now);
        Ok(())
    }

    /// Sell `shares` out of the available pool (instant buy).
    pub fn fill_available(&mut self, shares: u64, now: DateTime<Utc>) -> Result<()> {
        self.ensure_available(shares)?;
        self.remaining_shares -= shares;
        self.after_fill(now);
        Ok(())
    }

    /// Sell `shares` that were committed to a reservation.
    pub fn fill_reserved(&mut self, shares: u64, now: DateTime<Utc>) -> Result<()> {
        self.reserved_shares = self
            .reserved_shares
            .checked_sub(shares)
            .ok_or(FracshareError::ShareUnderflow)?;
        self.remaining_shares = self
            .remaining_shares
            .checked_sub(shares)
            .ok_or(FracshareError::ShareUnderflow)?;
        self.after_fill(now);
        Ok(())
    }

    /// Close the order for good. Returns the unsold shares going back to the seller.
    pub fn close(&mut self, status: OrderStatus, now: DateTime<Utc>) -> Result<u64> {
        if !self.status.is_open() {
            return Err(FracshareError::StateConflict {
                reason: format!("order {} is already {}", self.id, self.status),
            });
        }
        if self.held_shares > 0 || self.reserved_shares > 0 {
            return Err(FracshareError::StateConflict {
                reason: format!(
                    "order {} has {} held and {} reserved shares outstanding",
                    self.id, self.held_shares, self.reserved_shares
                ),
            });
        }
        self.status = status;
        self.updated_at = now;
        Ok(self.remaining_shares)
    }

    fn after_fill(&mut self, now: DateTime<Utc>) {
        if self.remaining_shares == 0 {
            self.status = OrderStatus::Completed;
            self.updated_at = now;
        } else {
            self.touch(now);
        }
    }

    /// Recompute the open status from the share split.
    fn touch(&mut self, now: DateTime<Utc>) {
        if self.status.is_open() {
            self.status = if self.available_shares() > 0 {
                OrderStatus::Active
            } else if self.reserved_shares > 0 {
                OrderStatus::AwaitingOfflineSettlement
            } else {
                OrderStatus::Reserved
            };
        }
        self.updated_at = now;
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl SellOrder {
    pub fn dummy(seller_id: UserId, shares: u64, ask_price: Decimal) -> Self {
        Self::new(
            seller_id,
            PropertyId::new(),
            shares,
            ask_price,
            None,
            Utc::now(),
        )
    }
}

/// `price × shares`, or `InvalidRequest` when the product leaves the
/// representable range.
pub fn trade_value(price: Decimal, shares: u64) -> Result<Decimal> {
    price
        .checked_mul(Decimal::from(shares))
        .ok_or_else(|| FracshareError::InvalidRequest {
            reason: format!("{shares} shares at {price} exceeds the representable amount"),
        })
}
