//! Trade records and settlement receipts.
//!
//! A [`Trade`] is the immutable record of shares and money changing hands,
//! whether through an instant buy or the settlement of a reservation.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{OrderId, PropertyId, ReservationId, SellOrder, TradeId, UserId, constants};

/// Which path produced a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reservation_id", rename_all = "snake_case")]
pub enum TradeSource {
    InstantBuy,
    Reservation(ReservationId),
}

/// How a gross amount splits between seller and platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: Decimal,
    pub fee: Decimal,
    pub seller_proceeds: Decimal,
}

impl FeeSplit {
    /// The fee is rounded to cents, half away from zero; the seller gets
    /// the exact remainder so `fee + seller_proceeds == gross`.
    #[must_use]
    pub fn compute(gross: Decimal, fee_rate: Decimal) -> Self {
        let fee = (gross * fee_rate).round_dp_with_strategy(
            constants::MONEY_PRECISION,
            RoundingStrategy::MidpointAwayFromZero,
        );
        Self {
            gross,
            fee,
            seller_proceeds: gross - fee,
        }
    }
}

/// An executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub order_id: OrderId,
    pub property_id: PropertyId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub shares: u64,
    pub price_per_share: Decimal,
    /// Debited from the buyer.
    pub gross_amount: Decimal,
    /// Kept as platform revenue.
    pub fee_amount: Decimal,
    /// Credited to the seller.
    pub seller_proceeds: Decimal,
    pub source: TradeSource,
    pub executed_at: DateTime<Utc>,
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} x{} @ {} = {} (fee {})",
            self.id,
            self.property_id,
            self.shares,
            self.price_per_share,
            self.gross_amount,
            self.fee_amount,
        )
    }
}

/// Outcome of a settlement, as returned to the caller and cached for retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub trade: Trade,
    /// The order after the trade.
    pub order: SellOrder,
    pub buyer_balance: Decimal,
    pub seller_balance: Decimal,
    /// Buyer's holding in the property after the trade.
    pub buyer_shares: u64,
    /// `true` when served from the idempotency cache.
    #[serde(default)]
    pub replayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_split_exact_rate() {
        let split = FeeSplit::compute(Decimal::new(1000, 0), Decimal::new(25, 3));
        assert_eq!(split.fee, Decimal::new(25, 0));
        assert_eq!(split.seller_proceeds, Decimal::new(975, 0));
    }

    #[test]
    fn fee_split_rounds_to_cents_and_conserves() {
        // 333.33 * 0.025 = 8.33325 -> 8.33
        let gross = Decimal::new(33333, 2);
        let split = FeeSplit::compute(gross, Decimal::new(25, 3));
        assert_eq!(split.fee, Decimal::new(833, 2));
        assert_eq!(split.fee + split.seller_proceeds, gross);
    }

    #[test]
    fn zero_fee_rate() {
        let split = FeeSplit::compute(Decimal::new(500, 0), Decimal::ZERO);
        assert_eq!(split.fee, Decimal::ZERO);
        assert_eq!(split.seller_proceeds, Decimal::new(500, 0));
    }

    #[test]
    fn trade_source_serde_shape() {
        let json = serde_json::to_value(TradeSource::InstantBuy).unwrap();
        assert_eq!(json["kind"], "instant_buy");
        let resv = ReservationId::new();
        let back: TradeSource =
            serde_json::from_value(serde_json::to_value(TradeSource::Reservation(resv)).unwrap())
                .unwrap();
        assert_eq!(back, TradeSource::Reservation(resv));
    }
}
