//! End-to-end integration tests for listing and instant settlement.
//!
//! These tests drive the registry and the settlement engine together over a
//! shared in-memory ledger: full fills, racing buyers, retried requests,
//! self-trade prevention, and conservation across randomized sequences.

use std::sync::Arc;

use fracshare_ledger::{LedgerStore, LedgerView, MemoryLedger};
use fracshare_settlement::{InstantBuyRequest, NewSellOrder, OrderRegistry, SettlementEngine};
use fracshare_types::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

/// A market with one seller and a shared ledger.
struct Market {
    ledger: Arc<MemoryLedger>,
    registry: OrderRegistry<MemoryLedger>,
    engine: Arc<SettlementEngine<MemoryLedger>>,
    seller: UserId,
    property: PropertyId,
}

impl Market {
    async fn new(issued: u64) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let seller = UserId::new();
        let property = PropertyId::new();
        ledger.issue_shares(seller, property, issued).await;
        let config = TradingConfig::default();
        Self {
            registry: OrderRegistry::new(Arc::clone(&ledger)),
            engine: Arc::new(SettlementEngine::new(Arc::clone(&ledger), &config)),
            ledger,
            seller,
            property,
        }
    }

    async fn list(&self, shares: u64, ask: Decimal) -> SellOrder {
        self.registry
            .create_sell_order(NewSellOrder {
                seller_id: self.seller,
                property_id: self.property,
                shares,
                ask_price: ask,
                expires_at: None,
            })
            .await
            .expect("listing should succeed")
    }

    async fn funded_buyer(&self, amount: Decimal) -> UserId {
        let buyer = UserId::new();
        self.ledger.deposit(buyer, amount).await.unwrap();
        buyer
    }

    async fn balance(&self, user: UserId) -> Decimal {
        self.ledger.read(|v| v.wallet_balance(user)).await
    }
}

fn request(buyer: UserId, order: OrderId, shares: u64, token: Option<&str>) -> InstantBuyRequest {
    InstantBuyRequest {
        buyer_id: buyer,
        order_id: order,
        shares,
        token: token.map(TransactionToken::from),
    }
}

// =============================================================================
// Buying out a whole listing
// =============================================================================
#[tokio::test]
async fn e2e_full_fill_completes_order() {
    let market = Market::new(10).await;
    let order = market.list(10, Decimal::new(100, 0)).await;
    let buyer = market.funded_buyer(Decimal::new(1000, 0)).await;

    let receipt = market
        .engine
        .instant_buy(request(buyer, order.id, 10, None))
        .await
        .unwrap();

    assert_eq!(receipt.order.status, OrderStatus::Completed);
    assert_eq!(market.balance(buyer).await, Decimal::ZERO);
    // 1000 × (1 − 0.025)
    assert_eq!(market.balance(market.seller).await, Decimal::new(975, 0));
    assert_eq!(
        market
            .ledger
            .read(|v| v.share_balance(buyer, market.property))
            .await,
        10
    );
    assert!(market.registry.list_active_orders(None).await.is_empty());
    market.ledger.audit().await.unwrap();
}

// =============================================================================
// Two buyers race for more shares than exist
// =============================================================================
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_buyers_never_oversell() {
    let market = Market::new(10).await;
    let order = market.list(10, Decimal::new(100, 0)).await;
    let a = market.funded_buyer(Decimal::new(1000, 0)).await;
    let b = market.funded_buyer(Decimal::new(1000, 0)).await;

    let order_id = order.id;
    let ea = Arc::clone(&market.engine);
    let eb = Arc::clone(&market.engine);
    let ta = tokio::spawn(async move { ea.instant_buy(request(a, order_id, 6, None)).await });
    let tb = tokio::spawn(async move { eb.instant_buy(request(b, order_id, 5, None)).await });
    let results = [ta.await.unwrap(), tb.await.unwrap()];

    let wins: Vec<&SettlementReceipt> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(wins.len(), 1, "exactly one buyer fills");
    let loss = results
        .iter()
        .find_map(|r| r.as_ref().err())
        .expect("one buyer fails");
    let remaining = wins[0].order.remaining_shares;
    assert!(
        matches!(loss, FracshareError::InsufficientShares { available, .. } if *available == remaining),
        "loser sees the fresh remaining count, got {loss:?}"
    );
    assert_eq!(loss.code(), "INSUFFICIENT_SHARES");
    market.ledger.audit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_many_concurrent_single_share_buys() {
    let market = Market::new(20).await;
    let order_id = market.list(20, Decimal::new(10, 0)).await.id;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let buyer = market.funded_buyer(Decimal::new(10, 0)).await;
        let engine = Arc::clone(&market.engine);
        handles.push(tokio::spawn(async move {
            engine.instant_buy(request(buyer, order_id, 1, None)).await
        }));
    }
    let mut filled = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            filled += 1;
        }
    }

    assert_eq!(filled, 20);
    let order = market.registry.get_order(order_id).await.unwrap();
    assert_eq!(order.remaining_shares, 0);
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(market.ledger.read(|v| v.trades().len()).await, 20);
    market.ledger.audit().await.unwrap();
}

// =============================================================================
// A retried request after a lost response
// =============================================================================
#[tokio::test]
async fn e2e_retry_with_token_debits_once() {
    let market = Market::new(10).await;
    let order = market.list(10, Decimal::new(100, 0)).await;
    let buyer = market.funded_buyer(Decimal::new(1000, 0)).await;

    let first = market
        .engine
        .instant_buy(request(buyer, order.id, 5, Some("abc")))
        .await
        .unwrap();
    let second = market
        .engine
        .instant_buy(request(buyer, order.id, 5, Some("abc")))
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.trade.id, second.trade.id);
    assert_eq!(market.balance(buyer).await, Decimal::new(500, 0));
    assert_eq!(
        market.registry.get_order(order.id).await.unwrap().remaining_shares,
        5
    );
    market.ledger.audit().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_retries_settle_once() {
    let market = Market::new(10).await;
    let order_id = market.list(10, Decimal::new(100, 0)).await.id;
    let buyer = market.funded_buyer(Decimal::new(1000, 0)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&market.engine);
        handles.push(tokio::spawn(async move {
            engine
                .instant_buy(request(buyer, order_id, 2, Some("same")))
                .await
        }));
    }
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) | Err(FracshareError::ConcurrentTransaction(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(market.ledger.read(|v| v.trades().len()).await, 1);
    assert_eq!(market.balance(buyer).await, Decimal::new(800, 0));
}

// =============================================================================
// Buying from your own listing
// =============================================================================
#[tokio::test]
async fn e2e_self_trade_changes_nothing() {
    let market = Market::new(10).await;
    let order = market.list(10, Decimal::new(100, 0)).await;
    market
        .ledger
        .deposit(market.seller, Decimal::new(1000, 0))
        .await
        .unwrap();

    let err = market
        .engine
        .instant_buy(request(market.seller, order.id, 1, None))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SelfTradeForbidden);
    assert_eq!(err.code(), "SELF_TRADE");
    assert_eq!(market.balance(market.seller).await, Decimal::new(1000, 0));
    assert_eq!(market.registry.get_order(order.id).await.unwrap(), order);
    market.ledger.audit().await.unwrap();
}

// =============================================================================
// Conservation across randomized sequences
// =============================================================================
#[tokio::test]
async fn e2e_randomized_trading_conserves_cash_and_shares() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let market = Market::new(500).await;
    let buyers: Vec<UserId> = {
        let mut v = Vec::new();
        for _ in 0..5 {
            v.push(market.funded_buyer(Decimal::new(rng.gen_range(100..5_000), 0)).await);
        }
        v
    };

    let mut orders = Vec::new();
    for _ in 0..4 {
        let ask = Decimal::new(rng.gen_range(101..9_999), 2);
        orders.push(market.list(rng.gen_range(10..100), ask).await.id);
    }

    for step in 0..200 {
        let buyer = buyers[rng.gen_range(0..buyers.len())];
        let order = orders[rng.gen_range(0..orders.len())];
        let shares = rng.gen_range(0..30);
        let token = format!("step-{}", step % 150);
        let _ = market
            .engine
            .instant_buy(request(buyer, order, shares, Some(&token)))
            .await;

        if step % 25 == 0 {
            market.ledger.audit().await.unwrap();
        }
    }
    market.ledger.audit().await.unwrap();

    market
        .ledger
        .read(|v| {
            for order in v.orders() {
                assert!(order.remaining_shares <= order.total_shares);
                assert_eq!(order.held_shares + order.reserved_shares, 0);
            }
            for user in &buyers {
                assert!(v.wallet_balance(*user) >= Decimal::ZERO);
            }
            let fees: Decimal = v.trades().iter().map(|t| t.fee_amount).sum();
            assert_eq!(fees, v.platform_revenue());
        })
        .await;
}

#[tokio::test]
async fn e2e_failed_transaction_rolls_back_everything() {
    let market = Market::new(10).await;
    let order = market.list(10, Decimal::new(100, 0)).await;
    let buyer = market.funded_buyer(Decimal::new(50, 0)).await;

    let before = market.ledger.read(|v| (v.orders(), v.trades().len())).await;
    let err = market
        .engine
        .instant_buy(request(buyer, order.id, 1, Some("broke")))
        .await
        .unwrap_err();
    assert!(matches!(err, FracshareError::InsufficientBalance { .. }));
    let after = market.ledger.read(|v| (v.orders(), v.trades().len())).await;
    assert_eq!(before.1, after.1);
    assert_eq!(before.0.len(), after.0.len());

    // The store itself is usable afterwards.
    let revenue = market
        .ledger
        .transaction(|txn| Ok(txn.platform_revenue()))
        .await
        .unwrap();
    assert_eq!(revenue, Decimal::ZERO);
}
