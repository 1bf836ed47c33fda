//! Order registry: listing, lookup, creation and cancellation of sell orders.
//!
//! Listing escrows the shares. They leave the seller's ownership record when
//! the order is created and only come back through cancellation or expiry,
//! so a seller can never list the same share twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fracshare_ledger::{LedgerStore, LedgerView};
use fracshare_types::{
    FracshareError, OrderId, OrderStatus, PropertyId, Result, SellOrder, UserId, trade_value,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::gate::{AllowAllGate, TradingGate};

/// Parameters of a new listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSellOrder {
    pub seller_id: UserId,
    pub property_id: PropertyId,
    pub shares: u64,
    pub ask_price: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Error unless buys and holds may be placed against `order` at `now`.
///
/// An order past its expiry counts as expired even before the sweeper
/// has closed it.
pub fn ensure_tradable(order: &SellOrder, now: DateTime<Utc>) -> Result<()> {
    order.ensure_active()?;
    if order.is_expired_at(now) {
        return Err(FracshareError::OrderInactive {
            order_id: order.id,
            status: OrderStatus::Expired,
        });
    }
    Ok(())
}

/// Error unless the gate allows trading `property`.
pub fn ensure_trading_enabled(gate: &dyn TradingGate, property: PropertyId) -> Result<()> {
    if gate.is_trading_enabled(property) {
        Ok(())
    } else {
        Err(FracshareError::TradingDisabled(property))
    }
}

/// Orders open for instant buys at `now`, newest first. Orders past their
/// expiry are left out whether or not the sweeper has closed them yet.
pub fn active_orders<V: LedgerView + ?Sized>(
    view: &V,
    property: Option<PropertyId>,
    now: DateTime<Utc>,
) -> Vec<SellOrder> {
    let mut orders: Vec<SellOrder> = view
        .orders()
        .into_iter()
        .filter(|o| o.status == OrderStatus::Active && o.remaining_shares > 0)
        .filter(|o| !o.is_expired_at(now))
        .filter(|o| property.is_none_or(|p| o.property_id == p))
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

/// Sell-order lifecycle outside of settlement.
pub struct OrderRegistry<L> {
    ledger: Arc<L>,
    gate: Arc<dyn TradingGate>,
}

impl<L: LedgerStore> OrderRegistry<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            gate: Arc::new(AllowAllGate),
        }
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn TradingGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Active orders with shares left, optionally for one property.
    pub async fn list_active_orders(&self, property: Option<PropertyId>) -> Vec<SellOrder> {
        self.list_active_orders_at(property, Utc::now()).await
    }

    pub async fn list_active_orders_at(
        &self,
        property: Option<PropertyId>,
        now: DateTime<Utc>,
    ) -> Vec<SellOrder> {
        self.ledger.read(|v| active_orders(v, property, now)).await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<SellOrder> {
        self.ledger.read(|v| v.require_order(order_id)).await
    }

    pub async fn create_sell_order(&self, request: NewSellOrder) -> Result<SellOrder> {
        self.create_sell_order_at(request, Utc::now()).await
    }

    /// List shares for sale, moving them out of the seller's ownership.
    ///
    /// # Errors
    /// - `InvalidRequest` for a zero share count, non-positive price, past expiry
    ///   or a total value too large to represent
    /// - `TradingDisabled` if the gate blocks the property
    /// - `InsufficientShares` if the seller owns fewer shares than listed
    pub async fn create_sell_order_at(
        &self,
        request: NewSellOrder,
        now: DateTime<Utc>,
    ) -> Result<SellOrder> {
        if request.shares == 0 {
            return Err(FracshareError::InvalidRequest {
                reason: "shares must be greater than zero".to_string(),
            });
        }
        if request.ask_price <= Decimal::ZERO {
            return Err(FracshareError::InvalidRequest {
                reason: format!("ask price must be positive, got {}", request.ask_price),
            });
        }
        // Any fill of the order is priced at most at its full value.
        trade_value(request.ask_price, request.shares)?;
        if request.expires_at.is_some_and(|at| at <= now) {
            return Err(FracshareError::InvalidRequest {
                reason: "expiry must be in the future".to_string(),
            });
        }
        ensure_trading_enabled(self.gate.as_ref(), request.property_id)?;

        let order = self
            .ledger
            .transaction(|txn| {
                txn.debit_shares(request.seller_id, request.property_id, request.shares)?;
                let order = SellOrder::new(
                    request.seller_id,
                    request.property_id,
                    request.shares,
                    request.ask_price,
                    request.expires_at,
                    now,
                );
                txn.put_order(order.clone());
                Ok(order)
            })
            .await
            .inspect_err(|e| debug!(seller = %request.seller_id, error = %e, "sell order rejected"))?;

        info!(
            order_id = %order.id,
            seller = %order.seller_id,
            property = %order.property_id,
            shares = order.total_shares,
            ask = %order.ask_price,
            "sell order listed"
        );
        Ok(order)
    }

    pub async fn cancel_sell_order(&self, seller: UserId, order_id: OrderId) -> Result<SellOrder> {
        self.cancel_sell_order_at(seller, order_id, Utc::now()).await
    }

    /// Withdraw a listing and return the unsold shares to the seller.
    ///
    /// # Errors
    /// - `NotParticipant` if `seller` does not own the order
    /// - `StateConflict` if the order is closed or has held or reserved shares
    pub async fn cancel_sell_order_at(
        &self,
        seller: UserId,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<SellOrder> {
        let order = self
            .ledger
            .transaction(|txn| {
                let mut order = txn.require_order(order_id)?;
                if order.seller_id != seller {
                    return Err(FracshareError::NotParticipant {
                        reason: format!("user {seller} is not the seller of order {order_id}"),
                    });
                }
                let unsold = order.close(OrderStatus::Cancelled, now)?;
                txn.credit_shares(order.seller_id, order.property_id, unsold)?;
                txn.put_order(order.clone());
                Ok(order)
            })
            .await?;

        info!(
            order_id = %order.id,
            returned = order.remaining_shares,
            "sell order cancelled"
        );
        Ok(order)
    }
}
