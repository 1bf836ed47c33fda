//! Atomic instant-buy settlement.
//!
//! An instant buy runs as one ledger transaction:
//! 1. Re-read the order and check it is active and unexpired
//! 2. Check the share count against the available pool
//! 3. Reject self-trades and gated properties
//! 4. Check the buyer can pay the gross amount
//! 5. Move cash (buyer → seller + platform fee) and shares (order → buyer)
//! 6. Record the trade and cache the receipt under the transaction token
//!
//! Any failure rolls the whole transaction back. The trade observer hears
//! about the trade only after commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fracshare_ledger::{LedgerStore, LedgerTxn};
use fracshare_types::{
    FeeSplit, FracshareError, OrderId, RequestFingerprint, Result, SellOrder, SettlementReceipt,
    Trade, TradeId, TradeSource, TradingConfig, TransactionToken, UserId, trade_value,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::gate::{AllowAllGate, NoopObserver, TradeObserver, TradingGate};
use crate::idempotency::{Claim, IdempotencyGuard};
use crate::registry::{ensure_tradable, ensure_trading_enabled};

/// An instant-buy request as it arrives from the API layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantBuyRequest {
    pub buyer_id: UserId,
    pub order_id: OrderId,
    pub shares: u64,
    /// Client idempotency token. One is generated when absent.
    pub token: Option<TransactionToken>,
}

/// Who buys how much at what price, and under which trade id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeTerms {
    pub trade_id: TradeId,
    pub buyer_id: UserId,
    pub shares: u64,
    pub price_per_share: Decimal,
    pub source: TradeSource,
}

/// Apply the ledger effects of a trade against `order`.
///
/// Shares come out of the available pool for instant buys and out of the
/// reserved pool for reservation settlements. The buyer pays the gross
/// amount, the seller receives it net of the platform fee and the fee is
/// booked as revenue, so no cash is created or destroyed. The updated order
/// and the trade are written; the caller owns the surrounding transaction.
pub fn apply_trade(
    txn: &mut dyn LedgerTxn,
    order: &mut SellOrder,
    terms: &TradeTerms,
    fee_rate: Decimal,
    now: DateTime<Utc>,
) -> Result<SettlementReceipt> {
    match terms.source {
        TradeSource::InstantBuy => order.fill_available(terms.shares, now)?,
        TradeSource::Reservation(_) => order.fill_reserved(terms.shares, now)?,
    }

    let gross = trade_value(terms.price_per_share, terms.shares)?;
    let split = FeeSplit::compute(gross, fee_rate);

    let buyer_balance = txn.debit_wallet(terms.buyer_id, split.gross)?;
    let seller_balance = txn.credit_wallet(order.seller_id, split.seller_proceeds)?;
    txn.add_platform_revenue(split.fee);
    let buyer_shares = txn.credit_shares(terms.buyer_id, order.property_id, terms.shares)?;

    let trade = Trade {
        id: terms.trade_id,
        order_id: order.id,
        property_id: order.property_id,
        buyer_id: terms.buyer_id,
        seller_id: order.seller_id,
        shares: terms.shares,
        price_per_share: terms.price_per_share,
        gross_amount: split.gross,
        fee_amount: split.fee,
        seller_proceeds: split.seller_proceeds,
        source: terms.source,
        executed_at: now,
    };
    txn.put_order(order.clone());
    txn.append_trade(trade.clone());

    Ok(SettlementReceipt {
        trade,
        order: order.clone(),
        buyer_balance,
        seller_balance,
        buyer_shares,
        replayed: false,
    })
}

/// The instant-buy path.
pub struct SettlementEngine<L> {
    ledger: Arc<L>,
    gate: Arc<dyn TradingGate>,
    observer: Arc<dyn TradeObserver>,
    guard: IdempotencyGuard,
    fee_rate: Decimal,
}

impl<L: LedgerStore> SettlementEngine<L> {
    /// An engine that allows every property and notifies nobody.
    pub fn new(ledger: Arc<L>, config: &TradingConfig) -> Self {
        Self {
            ledger,
            gate: Arc::new(AllowAllGate),
            observer: Arc::new(NoopObserver),
            guard: IdempotencyGuard::from_config(config),
            fee_rate: config.platform_fee_rate,
        }
    }

    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn TradingGate>) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TradeObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    pub async fn instant_buy(&self, request: InstantBuyRequest) -> Result<SettlementReceipt> {
        self.instant_buy_at(request, Utc::now()).await
    }

    /// Buy shares straight off an active order.
    ///
    /// A retried request carrying a completed token returns the original
    /// receipt with `replayed = true` and touches nothing.
    ///
    /// # Errors
    /// - `OrderNotFound` / `OrderInactive` for a missing, closed or expired order
    /// - `InvalidRequest` / `InsufficientShares` for a bad share count
    /// - `SelfTrade` if the buyer is the seller
    /// - `TradingDisabled` if the gate blocks the property
    /// - `InsufficientBalance` if the buyer cannot pay
    /// - `DuplicateTransaction` / `ConcurrentTransaction` on token misuse
    pub async fn instant_buy_at(
        &self,
        request: InstantBuyRequest,
        now: DateTime<Utc>,
    ) -> Result<SettlementReceipt> {
        let InstantBuyRequest {
            buyer_id,
            order_id,
            shares,
            token,
        } = request;
        let token = token.unwrap_or_else(TransactionToken::generate);
        IdempotencyGuard::validate_token(&token)?;
        let fingerprint = RequestFingerprint::instant_buy(buyer_id, order_id, shares);

        if let Claim::Replay(receipt) = self
            .guard
            .claim(self.ledger.as_ref(), &token, fingerprint, now)
            .await?
        {
            debug!(token = %token, trade_id = %receipt.trade.id, "instant buy replayed");
            return Ok(*receipt);
        }

        let outcome = self
            .ledger
            .transaction(|txn| {
                let mut order = txn.require_order(order_id)?;
                ensure_tradable(&order, now)?;
                order.ensure_available(shares)?;
                if buyer_id == order.seller_id {
                    return Err(FracshareError::SelfTrade);
                }
                ensure_trading_enabled(self.gate.as_ref(), order.property_id)?;
                let cost = order.cost_of(shares)?;
                let available = txn.wallet_balance(buyer_id);
                if available < cost {
                    return Err(FracshareError::InsufficientBalance {
                        needed: cost,
                        available,
                    });
                }

                let terms = TradeTerms {
                    trade_id: TradeId::for_claim(&token, now),
                    buyer_id,
                    shares,
                    price_per_share: order.ask_price,
                    source: TradeSource::InstantBuy,
                };
                let receipt = apply_trade(txn, &mut order, &terms, self.fee_rate, now)?;
                self.guard
                    .complete(txn, &token, fingerprint, &receipt, now)?;
                Ok(receipt)
            })
            .await;

        match outcome {
            Ok(receipt) => {
                info!(
                    trade_id = %receipt.trade.id,
                    order_id = %order_id,
                    buyer = %buyer_id,
                    shares,
                    gross = %receipt.trade.gross_amount,
                    fee = %receipt.trade.fee_amount,
                    order_status = %receipt.order.status,
                    "instant buy settled"
                );
                self.observer.trade_settled(&receipt.trade);
                Ok(receipt)
            }
            Err(e) => {
                debug!(
                    order_id = %order_id,
                    buyer = %buyer_id,
                    shares,
                    code = e.code(),
                    error = %e,
                    "instant buy rejected"
                );
                self.guard.abandon(self.ledger.as_ref(), &token).await;
                Err(e)
            }
        }
    }
}
