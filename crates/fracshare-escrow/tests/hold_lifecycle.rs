//! Integration tests for the negotiated settlement path.
//!
//! Holds, reservations and instant buys compete for the same listing here,
//! with the sweeper closing whatever times out.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fracshare_escrow::{EscrowManager, ExpirySweeper, HoldOutcome};
use fracshare_ledger::{LedgerStore, LedgerView, MemoryLedger};
use fracshare_settlement::{
    ChannelObserver, InstantBuyRequest, NewSellOrder, OrderRegistry, SettlementEngine,
};
use fracshare_types::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

struct Desk {
    ledger: Arc<MemoryLedger>,
    registry: OrderRegistry<MemoryLedger>,
    engine: SettlementEngine<MemoryLedger>,
    escrow: EscrowManager<MemoryLedger>,
    sweeper: ExpirySweeper<MemoryLedger>,
    seller: UserId,
    property: PropertyId,
}

impl Desk {
    async fn new() -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let config = TradingConfig::default();
        let seller = UserId::new();
        let property = PropertyId::new();
        ledger.issue_shares(seller, property, 1_000).await;
        Self {
            registry: OrderRegistry::new(Arc::clone(&ledger)),
            engine: SettlementEngine::new(Arc::clone(&ledger), &config),
            escrow: EscrowManager::new(Arc::clone(&ledger), &config),
            sweeper: ExpirySweeper::new(Arc::clone(&ledger), &config),
            ledger,
            seller,
            property,
        }
    }

    async fn list(&self, shares: u64) -> SellOrder {
        self.registry
            .create_sell_order(NewSellOrder {
                seller_id: self.seller,
                property_id: self.property,
                shares,
                ask_price: Decimal::new(100, 0),
                expires_at: None,
            })
            .await
            .unwrap()
    }

    async fn buyer(&self, cash: i64) -> UserId {
        let user = UserId::new();
        self.ledger.deposit(user, Decimal::new(cash, 0)).await.unwrap();
        user
    }

    async fn order(&self, id: OrderId) -> SellOrder {
        self.registry.get_order(id).await.unwrap()
    }
}

// =============================================================================
// Seller never confirms; the sweeper gives the shares back
// =============================================================================
#[tokio::test]
async fn unconfirmed_hold_expires_and_frees_shares() {
    let desk = Desk::new().await;
    let order = desk.list(10).await;
    let buyer = desk.buyer(1_000).await;
    let t0 = Utc::now();

    let hold = desk
        .escrow
        .create_buyer_hold_at(buyer, order.id, 3, t0)
        .await
        .unwrap();
    let confirmed_at = t0 + Duration::seconds(30);
    desk.escrow
        .confirm_at(Party::Buyer, buyer, hold.id, confirmed_at)
        .await
        .unwrap();
    assert_eq!(desk.order(order.id).await.available_shares(), 7);

    // Still inside the confirmation window.
    let report = desk
        .sweeper
        .sweep(confirmed_at + Duration::seconds(3_599))
        .await
        .unwrap();
    assert!(report.expired_holds.is_empty());

    let report = desk
        .sweeper
        .sweep(confirmed_at + Duration::seconds(3_600))
        .await
        .unwrap();
    assert_eq!(report.expired_holds, vec![hold.id]);
    assert_eq!(
        desk.escrow.get_hold(hold.id).await.unwrap().status,
        HoldStatus::Expired
    );
    let after = desk.order(order.id).await;
    assert_eq!(after.available_shares(), 10);
    assert_eq!(after.remaining_shares, 10);
    assert_eq!(desk.ledger.read(|v| v.wallet_balance(buyer)).await, Decimal::new(1_000, 0));
    desk.ledger.audit().await.unwrap();
}

// =============================================================================
// Holds and instant buys share one pool
// =============================================================================
#[tokio::test]
async fn held_shares_are_not_instantly_buyable() {
    let desk = Desk::new().await;
    let order = desk.list(10).await;
    let holder = desk.buyer(1_000).await;
    let other = desk.buyer(1_000).await;

    desk.escrow
        .create_buyer_hold(holder, order.id, 8)
        .await
        .unwrap();

    let err = desk
        .engine
        .instant_buy(InstantBuyRequest {
            buyer_id: other,
            order_id: order.id,
            shares: 3,
            token: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FracshareError::InsufficientShares {
            requested: 3,
            available: 2
        }
    ));

    let receipt = desk
        .engine
        .instant_buy(InstantBuyRequest {
            buyer_id: other,
            order_id: order.id,
            shares: 2,
            token: None,
        })
        .await
        .unwrap();
    assert_eq!(receipt.order.remaining_shares, 8);
    assert_eq!(receipt.order.status, OrderStatus::Reserved);
    desk.ledger.audit().await.unwrap();
}

#[tokio::test]
async fn seller_cannot_cancel_listing_under_hold() {
    let desk = Desk::new().await;
    let order = desk.list(10).await;
    let buyer = desk.buyer(1_000).await;
    let hold = desk.escrow.create_buyer_hold(buyer, order.id, 1).await.unwrap();

    let err = desk
        .registry
        .cancel_sell_order(desk.seller, order.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    desk.escrow.cancel_hold(buyer, hold.id).await.unwrap();
    let cancelled = desk
        .registry
        .cancel_sell_order(desk.seller, order.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    desk.ledger.audit().await.unwrap();
}

// =============================================================================
// Full negotiated trade
// =============================================================================
#[tokio::test]
async fn negotiated_trade_settles_like_an_instant_buy() {
    let ledger = Arc::new(MemoryLedger::new());
    let config = TradingConfig::default();
    let (observer, mut trades) = ChannelObserver::channel();
    let escrow = EscrowManager::new(Arc::clone(&ledger), &config).with_observer(Arc::new(observer));
    let registry = OrderRegistry::new(Arc::clone(&ledger));

    let seller = UserId::new();
    let buyer = UserId::new();
    let property = PropertyId::new();
    ledger.issue_shares(seller, property, 20).await;
    ledger.deposit(buyer, Decimal::new(5_000, 0)).await.unwrap();

    let order = registry
        .create_sell_order(NewSellOrder {
            seller_id: seller,
            property_id: property,
            shares: 20,
            ask_price: Decimal::new(12_345, 2),
            expires_at: None,
        })
        .await
        .unwrap();

    let hold = escrow.create_buyer_hold(buyer, order.id, 7).await.unwrap();
    escrow.seller_confirm_hold(seller, hold.id).await.unwrap();
    let HoldOutcome::Reserved(reservation) = escrow.buyer_confirm_hold(buyer, hold.id).await.unwrap()
    else {
        panic!("expected reservation");
    };
    assert_eq!(
        reservation.expires_at - reservation.created_at,
        Duration::seconds(172_800)
    );

    let settlement = escrow
        .admin_settle_reservation(reservation.id, true, None)
        .await
        .unwrap();
    let receipt = settlement.receipt.unwrap();

    // 7 × 123.45 = 864.15; fee 2.5% = 21.60375 → 21.60
    assert_eq!(receipt.trade.gross_amount, Decimal::new(86_415, 2));
    assert_eq!(receipt.trade.fee_amount, Decimal::new(2_160, 2));
    assert_eq!(receipt.seller_balance, Decimal::new(84_255, 2));
    assert_eq!(receipt.buyer_balance, Decimal::new(413_585, 2));

    let seen = trades.recv().await.unwrap();
    assert_eq!(seen.source, TradeSource::Reservation(reservation.id));
    assert_eq!(ledger.read(|v| v.platform_revenue()).await, Decimal::new(2_160, 2));
    ledger.audit().await.unwrap();
}

// =============================================================================
// Conservation across randomized hold and buy traffic
// =============================================================================
#[tokio::test]
async fn randomized_mixed_traffic_conserves_everything() {
    let mut rng = StdRng::seed_from_u64(42);
    let desk = Desk::new().await;
    let mut buyers = Vec::new();
    for _ in 0..4 {
        buyers.push(desk.buyer(rng.gen_range(500..3_000)).await);
    }
    let orders = [desk.list(40).await.id, desk.list(60).await.id];
    let mut holds: Vec<HoldId> = Vec::new();
    let mut reservations: Vec<ReservationId> = Vec::new();
    let mut clock = Utc::now();

    for _ in 0..300 {
        clock += Duration::seconds(rng.gen_range(0..120));
        let buyer = buyers[rng.gen_range(0..buyers.len())];
        let order = orders[rng.gen_range(0..orders.len())];
        match rng.gen_range(0..7) {
            0 => {
                let _ = desk
                    .engine
                    .instant_buy_at(
                        InstantBuyRequest {
                            buyer_id: buyer,
                            order_id: order,
                            shares: rng.gen_range(1..5),
                            token: None,
                        },
                        clock,
                    )
                    .await;
            }
            1 => {
                if let Ok(hold) = desk
                    .escrow
                    .create_buyer_hold_at(buyer, order, rng.gen_range(1..6), clock)
                    .await
                {
                    holds.push(hold.id);
                }
            }
            2 | 3 if !holds.is_empty() => {
                let id = holds[rng.gen_range(0..holds.len())];
                let hold = desk.escrow.get_hold(id).await.unwrap();
                let (party, caller) = if rng.gen_bool(0.5) {
                    (Party::Buyer, hold.buyer_id)
                } else {
                    (Party::Seller, hold.seller_id)
                };
                if let Ok(HoldOutcome::Reserved(r)) =
                    desk.escrow.confirm_at(party, caller, id, clock).await
                {
                    reservations.push(r.id);
                }
            }
            4 if !holds.is_empty() => {
                let id = holds[rng.gen_range(0..holds.len())];
                let hold = desk.escrow.get_hold(id).await.unwrap();
                let _ = desk.escrow.cancel_hold_at(hold.buyer_id, id, clock).await;
            }
            5 if !reservations.is_empty() => {
                let id = reservations[rng.gen_range(0..reservations.len())];
                let _ = desk
                    .escrow
                    .admin_settle_reservation_at(id, rng.gen_bool(0.7), None, clock)
                    .await;
            }
            _ => {
                desk.sweeper.sweep(clock).await.unwrap();
            }
        }
        desk.ledger.audit().await.unwrap();
    }

    desk.ledger
        .read(|v| {
            for order in v.orders() {
                let pending: u64 = v
                    .holds()
                    .iter()
                    .filter(|h| h.order_id == order.id && h.status.is_pending())
                    .map(|h| h.shares)
                    .sum();
                let active: u64 = v
                    .reservations()
                    .iter()
                    .filter(|r| r.order_id == order.id && r.status == ReservationStatus::Active)
                    .map(|r| r.shares)
                    .sum();
                assert_eq!(order.held_shares, pending, "held shares match pending holds");
                assert_eq!(order.reserved_shares, active, "reserved shares match active reservations");
                assert!(order.held_shares + order.reserved_shares <= order.remaining_shares);
            }
        })
        .await;
}

// =============================================================================
// Buyers racing for holds on one listing from several worker threads
// =============================================================================
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_holds_never_overcommit_a_listing() {
    let desk = Desk::new().await;
    let order = desk.list(20).await;
    let escrow = Arc::new(EscrowManager::new(
        Arc::clone(&desk.ledger),
        &TradingConfig::default(),
    ));

    let mut handles = Vec::new();
    for i in 0..40u64 {
        let escrow = Arc::clone(&escrow);
        let buyer = UserId::new();
        let order_id = order.id;
        let shares = i % 3 + 1;
        handles.push(tokio::spawn(async move {
            escrow.create_buyer_hold(buyer, order_id, shares).await
        }));
    }
    let mut held = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(hold) => held += hold.shares,
            Err(e) => assert!(
                matches!(
                    e,
                    FracshareError::InsufficientShares { .. } | FracshareError::OrderInactive { .. }
                ),
                "unexpected rejection: {e}"
            ),
        }
    }

    let after = desk.order(order.id).await;
    assert!(held <= after.remaining_shares);
    assert_eq!(after.held_shares, held);
    assert_eq!(after.remaining_shares, 20);
    let active: u64 = desk
        .ledger
        .read(|v| {
            v.holds()
                .iter()
                .filter(|h| h.order_id == order.id && h.status.is_pending())
                .map(|h| h.shares)
                .sum()
        })
        .await;
    assert_eq!(active, held);
    desk.ledger.audit().await.unwrap();
}

#[tokio::test]
async fn store_transaction_boundary_is_shared() {
    let desk = Desk::new().await;
    let order = desk.list(5).await;
    let buyer = desk.buyer(100).await;
    desk.escrow.create_buyer_hold(buyer, order.id, 5).await.unwrap();

    // A hand-written transaction sees the hold's effect on the order row.
    let held = desk
        .ledger
        .transaction(|txn| Ok(txn.require_order(order.id)?.held_shares))
        .await
        .unwrap();
    assert_eq!(held, 5);
}
