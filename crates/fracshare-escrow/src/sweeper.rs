//! Expiry sweeper: closes everything whose deadline has passed.
//!
//! One sweep is one ledger transaction:
//! 1. Active reservations past `expires_at` → EXPIRED, shares back to the pool
//! 2. Pending holds past their stage deadline → EXPIRED, shares back to the pool
//! 3. Open orders past `expires_at` with nothing reserved → EXPIRED; their
//!    pending holds expire with them and the unsold shares return to the seller
//! 4. Idempotency rows past retention are pruned
//!
//! Orders with reserved shares wait for the reservation to settle or expire.
//! No sweep ever touches a wallet.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fracshare_ledger::{LedgerStore, LedgerTxn};
use fracshare_settlement::IdempotencyGuard;
use fracshare_types::{
    HoldId, OrderId, OrderStatus, ReservationId, ReservationStatus, Result, TradingConfig,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::escrow::{expire_hold, expire_reservation};

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_orders: Vec<OrderId>,
    pub expired_holds: Vec<HoldId>,
    pub expired_reservations: Vec<ReservationId>,
    /// Unsold shares returned to sellers of expired orders.
    pub returned_shares: u64,
    pub pruned_tokens: usize,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired_orders.is_empty()
            && self.expired_holds.is_empty()
            && self.expired_reservations.is_empty()
            && self.pruned_tokens == 0
    }
}

/// Run every expiry rule against `txn` as of `now`.
pub fn sweep_expired(
    txn: &mut dyn LedgerTxn,
    guard: &IdempotencyGuard,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    let mut reservations = txn.reservations();
    reservations.sort_by_key(|r| r.id);
    for mut reservation in reservations {
        if reservation.status == ReservationStatus::Active && reservation.is_expired_at(now) {
            expire_reservation(txn, &mut reservation, now)?;
            report.expired_reservations.push(reservation.id);
        }
    }

    let mut holds = txn.holds();
    holds.sort_by_key(|h| h.id);
    for mut hold in holds {
        if hold.status.is_pending() && hold.is_expired_at(now) {
            expire_hold(txn, &mut hold, now)?;
            report.expired_holds.push(hold.id);
        }
    }

    let mut orders = txn.orders();
    orders.sort_by_key(|o| o.id);
    for order in orders {
        if !order.status.is_open() || !order.is_expired_at(now) || order.reserved_shares > 0 {
            continue;
        }
        // Holds still inside their own window go down with the order.
        let mut holds = txn.holds();
        holds.sort_by_key(|h| h.id);
        for mut hold in holds {
            if hold.order_id == order.id && hold.status.is_pending() {
                expire_hold(txn, &mut hold, now)?;
                report.expired_holds.push(hold.id);
            }
        }
        // Re-read: the hold releases above rewrote the row.
        let mut order = txn.require_order(order.id)?;
        let unsold = order.close(OrderStatus::Expired, now)?;
        txn.credit_shares(order.seller_id, order.property_id, unsold)?;
        txn.put_order(order.clone());
        report.expired_orders.push(order.id);
        report.returned_shares += unsold;
    }

    report.pruned_tokens = guard.prune(txn, now);
    Ok(report)
}

/// Runs [`sweep_expired`] on demand or on a fixed period.
pub struct ExpirySweeper<L> {
    ledger: Arc<L>,
    guard: IdempotencyGuard,
}

impl<L: LedgerStore + 'static> ExpirySweeper<L> {
    pub fn new(ledger: Arc<L>, config: &TradingConfig) -> Self {
        Self {
            ledger,
            guard: IdempotencyGuard::from_config(config),
        }
    }

    /// Sweep once as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let report = self
            .ledger
            .transaction(|txn| sweep_expired(txn, &self.guard, now))
            .await?;
        if !report.is_empty() {
            info!(
                orders = report.expired_orders.len(),
                holds = report.expired_holds.len(),
                reservations = report.expired_reservations.len(),
                returned_shares = report.returned_shares,
                pruned_tokens = report.pruned_tokens,
                "expiry sweep"
            );
        }
        Ok(report)
    }

    /// Sweep every `period` until `shutdown` flips to `true` or its sender drops.
    pub fn spawn(
        self: Arc<Self>,
        period: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs_f64(), "expiry sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep(Utc::now()).await {
                            Ok(report) if report.is_empty() => debug!("expiry sweep: nothing due"),
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "expiry sweep failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("expiry sweeper stopped");
        })
    }
}
