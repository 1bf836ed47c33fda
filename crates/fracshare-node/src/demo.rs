//! Scripted walk through the reference trading scenarios.
//!
//! Each scenario gets its own listing on a shared node and logs what
//! happened; the run ends with a conservation audit of the ledger.

use std::sync::Arc;

use anyhow::{Result, bail, ensure};
use chrono::{Duration, Utc};
use fracshare_ledger::LedgerStore;
use fracshare_settlement::{InstantBuyRequest, NewSellOrder};
use fracshare_types::{
    FracshareError, HoldStatus, OrderStatus, Party, PropertyId, SellOrder, TransactionToken, UserId,
};
use rust_decimal::Decimal;
use tracing::info;

use crate::node::Node;

/// Run every scenario in order. Fails on the first one that misbehaves.
pub async fn run(node: &Node) -> Result<()> {
    let seller = UserId::new();
    let property = PropertyId::new();
    node.ledger.issue_shares(seller, property, 1_000).await;
    info!(%seller, %property, issued = 1_000, "demo seller funded with shares");

    full_fill(node, seller, property).await?;
    racing_buyers(node, seller, property).await?;
    retried_request(node, seller, property).await?;
    unconfirmed_hold(node, seller, property).await?;
    self_trade(node, seller, property).await?;
    gated_property(node, seller, property).await?;

    node.ledger.audit().await?;
    let revenue = node.ledger.read(|v| v.platform_revenue()).await;
    let trades = node.ledger.read(|v| v.trades().len()).await;
    info!(trades, %revenue, "demo finished; ledger conserves cash and shares");
    Ok(())
}

async fn list(node: &Node, seller: UserId, property: PropertyId, shares: u64) -> Result<SellOrder> {
    Ok(node
        .registry
        .create_sell_order(NewSellOrder {
            seller_id: seller,
            property_id: property,
            shares,
            ask_price: Decimal::new(100, 0),
            expires_at: None,
        })
        .await?)
}

async fn funded(node: &Node, amount: i64) -> Result<UserId> {
    let user = UserId::new();
    node.ledger.deposit(user, Decimal::new(amount, 0)).await?;
    Ok(user)
}

async fn full_fill(node: &Node, seller: UserId, property: PropertyId) -> Result<()> {
    let order = list(node, seller, property, 10).await?;
    let buyer = funded(node, 1_000).await?;
    let receipt = node
        .engine
        .instant_buy(InstantBuyRequest {
            buyer_id: buyer,
            order_id: order.id,
            shares: 10,
            token: None,
        })
        .await?;

    ensure!(receipt.order.status == OrderStatus::Completed, "order should complete");
    ensure!(receipt.buyer_balance.is_zero(), "buyer should spend everything");
    info!(
        receipt = %serde_json::to_string(&receipt)?,
        "scenario 1: full fill"
    );
    Ok(())
}

async fn racing_buyers(node: &Node, seller: UserId, property: PropertyId) -> Result<()> {
    let order_id = list(node, seller, property, 10).await?.id;
    let a = funded(node, 1_000).await?;
    let b = funded(node, 1_000).await?;

    let ea = Arc::clone(&node.engine);
    let eb = Arc::clone(&node.engine);
    let ta = tokio::spawn(async move {
        ea.instant_buy(InstantBuyRequest {
            buyer_id: a,
            order_id,
            shares: 6,
            token: None,
        })
        .await
    });
    let tb = tokio::spawn(async move {
        eb.instant_buy(InstantBuyRequest {
            buyer_id: b,
            order_id,
            shares: 5,
            token: None,
        })
        .await
    });

    let (ra, rb) = (ta.await?, tb.await?);
    let loser = match (&ra, &rb) {
        (Ok(_), Err(e)) | (Err(e), Ok(_)) => e,
        _ => bail!("exactly one racing buyer should fill, got {ra:?} and {rb:?}"),
    };
    ensure!(
        matches!(loser, FracshareError::InsufficientShares { .. }),
        "loser should see INSUFFICIENT_SHARES, got {loser}"
    );
    info!(
        loser = %serde_json::to_string(&loser.to_response())?,
        "scenario 2: racing buyers never oversell"
    );
    Ok(())
}

async fn retried_request(node: &Node, seller: UserId, property: PropertyId) -> Result<()> {
    let order = list(node, seller, property, 10).await?;
    let buyer = funded(node, 1_000).await?;
    let request = InstantBuyRequest {
        buyer_id: buyer,
        order_id: order.id,
        shares: 5,
        token: Some(TransactionToken::from("abc")),
    };

    let first = node.engine.instant_buy(request.clone()).await?;
    let second = node.engine.instant_buy(request).await?;
    ensure!(second.replayed && first.trade.id == second.trade.id, "retry should replay");
    let balance = node.ledger.read(|v| v.wallet_balance(buyer)).await;
    ensure!(balance == Decimal::new(500, 0), "buyer debited once, has {balance}");
    info!(trade_id = %first.trade.id, %balance, "scenario 3: retried request settles once");
    Ok(())
}

async fn unconfirmed_hold(node: &Node, seller: UserId, property: PropertyId) -> Result<()> {
    let order = list(node, seller, property, 10).await?;
    let buyer = funded(node, 1_000).await?;
    let t0 = Utc::now();

    let hold = node.escrow.create_buyer_hold_at(buyer, order.id, 3, t0).await?;
    node.escrow
        .confirm_at(Party::Buyer, buyer, hold.id, t0)
        .await?;
    let held = node.registry.get_order(order.id).await?.available_shares();

    // Simulated clock: the seller stays silent past the confirmation window.
    let later = t0 + node.config.confirmation_ttl() + Duration::seconds(1);
    let report = node.sweeper.sweep(later).await?;
    ensure!(report.expired_holds.contains(&hold.id), "hold should expire");
    ensure!(
        node.escrow.get_hold(hold.id).await?.status == HoldStatus::Expired,
        "hold should be EXPIRED"
    );
    let freed = node.registry.get_order(order.id).await?.available_shares();
    ensure!(freed == held + 3, "available pool should regain 3 shares");
    info!(hold_id = %hold.id, before = held, after = freed, "scenario 4: unconfirmed hold expires");
    Ok(())
}

async fn self_trade(node: &Node, seller: UserId, property: PropertyId) -> Result<()> {
    let order = list(node, seller, property, 10).await?;
    node.ledger.deposit(seller, Decimal::new(1_000, 0)).await?;
    let before = node.ledger.read(|v| v.wallet_balance(seller)).await;

    let err = node
        .engine
        .instant_buy(InstantBuyRequest {
            buyer_id: seller,
            order_id: order.id,
            shares: 1,
            token: None,
        })
        .await;
    let Err(err) = err else {
        bail!("self trade should be rejected");
    };
    ensure!(matches!(err, FracshareError::SelfTrade), "expected SELF_TRADE, got {err}");
    ensure!(
        node.ledger.read(|v| v.wallet_balance(seller)).await == before,
        "self trade must not move cash"
    );
    ensure!(
        node.registry.get_order(order.id).await? == order,
        "self trade must not touch the order"
    );
    info!(code = err.code(), message = err.user_message(), "scenario 5: self trade refused");
    Ok(())
}

async fn gated_property(node: &Node, seller: UserId, property: PropertyId) -> Result<()> {
    let order = list(node, seller, property, 5).await?;
    let buyer = funded(node, 1_000).await?;
    node.gate.disable(property);
    let result = node.escrow.create_buyer_hold(buyer, order.id, 1).await;
    node.gate.enable(property);

    let Err(err) = result else {
        bail!("holds on a disabled property should be rejected");
    };
    ensure!(
        matches!(err, FracshareError::TradingDisabled(_)),
        "expected TRADING_DISABLED, got {err}"
    );
    info!(code = err.code(), "trading gate refuses holds while disabled");
    Ok(())
}
