//! Collaborator seams: the per-property trading switch and the post-trade
//! notification consumed by tier recalculation.

use std::collections::HashSet;
use std::sync::RwLock;

use fracshare_types::{PropertyId, Trade};
use tokio::sync::mpsc;

/// Decides whether a property may currently be traded.
pub trait TradingGate: Send + Sync {
    fn is_trading_enabled(&self, property: PropertyId) -> bool;
}

/// Every property is tradable.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllGate;

impl TradingGate for AllowAllGate {
    fn is_trading_enabled(&self, _property: PropertyId) -> bool {
        true
    }
}

/// An operator-maintained deny list.
#[derive(Debug, Default)]
pub struct PropertyGate {
    disabled: RwLock<HashSet<PropertyId>>,
}

impl PropertyGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disable(&self, property: PropertyId) {
        if let Ok(mut set) = self.disabled.write() {
            set.insert(property);
        }
    }

    pub fn enable(&self, property: PropertyId) {
        if let Ok(mut set) = self.disabled.write() {
            set.remove(&property);
        }
    }
}

impl TradingGate for PropertyGate {
    fn is_trading_enabled(&self, property: PropertyId) -> bool {
        // A poisoned lock fails closed.
        self.disabled
            .read()
            .is_ok_and(|set| !set.contains(&property))
    }
}

/// Told about every committed trade. Must not block; failures are the
/// observer's problem and never undo the trade.
pub trait TradeObserver: Send + Sync {
    fn trade_settled(&self, trade: &Trade);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TradeObserver for NoopObserver {
    fn trade_settled(&self, _trade: &Trade) {}
}

/// Forwards trades to an async consumer over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<Trade>,
}

impl ChannelObserver {
    /// Build an observer and the receiving end its consumer drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Trade>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TradeObserver for ChannelObserver {
    fn trade_settled(&self, trade: &Trade) {
        if self.tx.send(trade.clone()).is_err() {
            tracing::warn!(trade_id = %trade.id, "trade observer receiver dropped; notification lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fracshare_types::{OrderId, TradeId, TradeSource, UserId};
    use rust_decimal::Decimal;

    fn trade() -> Trade {
        Trade {
            id: TradeId::new(),
            order_id: OrderId::new(),
            property_id: PropertyId::new(),
            buyer_id: UserId::new(),
            seller_id: UserId::new(),
            shares: 1,
            price_per_share: Decimal::ONE,
            gross_amount: Decimal::ONE,
            fee_amount: Decimal::ZERO,
            seller_proceeds: Decimal::ONE,
            source: TradeSource::InstantBuy,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn property_gate_toggles() {
        let gate = PropertyGate::new();
        let p = PropertyId::new();
        assert!(gate.is_trading_enabled(p));
        gate.disable(p);
        assert!(!gate.is_trading_enabled(p));
        assert!(gate.is_trading_enabled(PropertyId::new()));
        gate.enable(p);
        assert!(gate.is_trading_enabled(p));
    }

    #[tokio::test]
    async fn channel_observer_delivers() {
        let (observer, mut rx) = ChannelObserver::channel();
        let t = trade();
        observer.trade_settled(&t);
        assert_eq!(rx.recv().await, Some(t));
    }

    #[test]
    fn channel_observer_survives_dropped_receiver() {
        let (observer, rx) = ChannelObserver::channel();
        drop(rx);
        observer.trade_settled(&trade());
    }
}
