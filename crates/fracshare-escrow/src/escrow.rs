//! Escrow manager: buyer holds, two-sided confirmation and reservations.
//!
//! A hold takes shares out of an order's available pool while both parties
//! confirm. Once both have, the hold converts into a [`Reservation`] whose
//! shares stay committed until an administrator records the outcome of the
//! offline settlement:
//!
//! ```text
//!   CreateBuyerHold ─▶ hold ACTIVE ─▶ buyer/seller confirm ─▶ BOTH_CONFIRMED
//!                                                               │ convert
//!                                                               ▼
//!   AdminSettleReservation(success) ◀── reservation ACTIVE ◀── hold RELEASED
//!       ├─ true  → trade executed, reservation COMPLETED
//!       └─ false → shares returned, reservation CANCELLED
//! ```
//!
//! Every step runs inside one ledger transaction. Holds carry no wallet
//! effects; cash only moves when a reservation settles successfully.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fracshare_ledger::{LedgerStore, LedgerTxn};
use fracshare_settlement::{
    AllowAllGate, NoopObserver, TradeObserver, TradeTerms, TradingGate, apply_trade,
    ensure_tradable, ensure_trading_enabled,
};
use fracshare_types::{
    BuyerHold, FracshareError, HoldId, HoldStatus, OrderId, Party, Reservation, ReservationId,
    ReservationStatus, Result, SettlementReceipt, TradeId, TradeSource, TradingConfig, UserId,
    deadline_after,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Result of a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Still waiting on the other party.
    Pending(BuyerHold),
    /// Both parties confirmed; the hold became this reservation.
    Reserved(Reservation),
}

/// Result of an administrator settling a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationSettlement {
    pub reservation: Reservation,
    /// Present when the settlement succeeded and a trade executed.
    pub receipt: Option<SettlementReceipt>,
}

/// A transaction that may have to commit an expiry before reporting it.
enum Checked<T> {
    Done(T),
    Expired,
}

/// Pending hold → EXPIRED, returning its shares to the order's available pool.
pub fn expire_hold(txn: &mut dyn LedgerTxn, hold: &mut BuyerHold, now: DateTime<Utc>) -> Result<()> {
    hold.mark_expired(now)?;
    let mut order = txn.require_order(hold.order_id)?;
    order.release_hold(hold.shares, now)?;
    txn.put_order(order);
    txn.put_hold(hold.clone());
    Ok(())
}

/// Active reservation → EXPIRED, returning its shares to the order's available pool.
pub fn expire_reservation(
    txn: &mut dyn LedgerTxn,
    reservation: &mut Reservation,
    now: DateTime<Utc>,
) -> Result<()> {
    reservation.mark_expired(now)?;
    let mut order = txn.require_order(reservation.order_id)?;
    order.release_reservation(reservation.shares, now)?;
    txn.put_order(order);
    txn.put_reservation(reservation.clone());
    Ok(())
}

/// Manages the hold and reservation lifecycle.
pub struct EscrowManager<L> {
    ledger: Arc<L>,
    gate: Arc<dyn TradingGate>,
    observer: Arc<dyn TradeObserver>,
    fee_rate: Decimal,
    buyer_hold_ttl: Duration,
    confirmation_ttl: Duration,
    reservation_ttl: Duration,
}

impl<L: LedgerStore> EscrowManager<L> {
    pub fn new(ledger: Arc<L>, config: &TradingConfig) -> Self {
        Self {
            ledger,
            gate: Arc::new(AllowAllGate),
            observer: Arc::new(NoopObserver),
            fee_rate: config.platform_fee_rate,
            buyer_hold_ttl: config.buyer_hold_ttl(),
            confirmation_ttl: config.confirmation_ttl(),
            reservation_ttl: config.reservation_ttl(),
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

    pub async fn create_buyer_hold(
        &self,
        buyer: UserId,
        order_id: OrderId,
        shares: u64,
    ) -> Result<BuyerHold> {
        self.create_buyer_hold_at(buyer, order_id, shares, Utc::now())
            .await
    }

    /// Hold `shares` of an active order for `buyer`.
    ///
    /// # Errors
    /// - `OrderNotFound` / `OrderInactive` for a missing, closed or expired order
    /// - `InvalidRequest` / `InsufficientShares` for a bad share count
    /// - `SelfTrade` if the buyer is the seller
    /// - `TradingDisabled` if the gate blocks the property
    pub async fn create_buyer_hold_at(
        &self,
        buyer: UserId,
        order_id: OrderId,
        shares: u64,
        now: DateTime<Utc>,
    ) -> Result<BuyerHold> {
        let hold = self
            .ledger
            .transaction(|txn| {
                let mut order = txn.require_order(order_id)?;
                ensure_tradable(&order, now)?;
                order.ensure_available(shares)?;
                if buyer == order.seller_id {
                    return Err(FracshareError::SelfTrade);
                }
                ensure_trading_enabled(self.gate.as_ref(), order.property_id)?;

                let expires_at = deadline_after(now, self.buyer_hold_ttl)?;
                order.place_hold(shares, now)?;
                let hold = BuyerHold::new(&order, buyer, shares, expires_at, now);
                txn.put_order(order);
                txn.put_hold(hold.clone());
                Ok(hold)
            })
            .await
            .inspect_err(|e| debug!(order_id = %order_id, buyer = %buyer, error = %e, "hold rejected"))?;

        info!(
            hold_id = %hold.id,
            order_id = %order_id,
            buyer = %buyer,
            shares,
            expires_at = %hold.expires_at,
            "buyer hold placed"
        );
        Ok(hold)
    }

    pub async fn buyer_confirm_hold(&self, buyer: UserId, hold_id: HoldId) -> Result<HoldOutcome> {
        self.confirm_at(Party::Buyer, buyer, hold_id, Utc::now()).await
    }

    pub async fn seller_confirm_hold(&self, seller: UserId, hold_id: HoldId) -> Result<HoldOutcome> {
        self.confirm_at(Party::Seller, seller, hold_id, Utc::now()).await
    }

    /// Record `party`'s confirmation of a hold.
    ///
    /// The first confirmation moves the deadline to `now + confirmation_ttl`.
    /// The second converts the hold into a reservation. A hold found past its
    /// deadline is expired on the spot and its shares released.
    ///
    /// # Errors
    /// - `HoldNotFound`
    /// - `NotParticipant` if `caller` is not the hold's `party`
    /// - `HoldExpired` if the deadline has passed, whether or not the sweeper got there first
    /// - `StateConflict` if the party already confirmed, or the hold was released or converted
    pub async fn confirm_at(
        &self,
        party: Party,
        caller: UserId,
        hold_id: HoldId,
        now: DateTime<Utc>,
    ) -> Result<HoldOutcome> {
        let step = self
            .ledger
            .transaction(|txn| {
                let mut hold = txn.require_hold(hold_id)?;
                if hold.party_of(caller) != Some(party) {
                    return Err(FracshareError::NotParticipant {
                        reason: format!("user {caller} is not the {party} on hold {hold_id}"),
                    });
                }
                if hold.status == HoldStatus::Expired {
                    return Err(FracshareError::HoldExpired(hold_id));
                }
                if hold.status.is_pending() && hold.is_expired_at(now) {
                    expire_hold(txn, &mut hold, now)?;
                    return Ok(Checked::Expired);
                }

                let deadline = deadline_after(now, self.confirmation_ttl)?;
                let both = hold.confirm(party, deadline, now)?;
                if !both {
                    txn.put_hold(hold.clone());
                    return Ok(Checked::Done(HoldOutcome::Pending(hold)));
                }

                let mut order = txn.require_order(hold.order_id)?;
                order.convert_hold(hold.shares, now)?;
                let expires_at = deadline_after(now, self.reservation_ttl)?;
                let reservation = Reservation::from_hold(&hold, expires_at, now);
                hold.mark_converted(reservation.id, now)?;
                txn.put_order(order);
                txn.put_hold(hold);
                txn.put_reservation(reservation.clone());
                Ok(Checked::Done(HoldOutcome::Reserved(reservation)))
            })
            .await?;

        match step {
            Checked::Done(HoldOutcome::Pending(hold)) => {
                info!(hold_id = %hold_id, %party, status = %hold.status, "hold confirmed");
                Ok(HoldOutcome::Pending(hold))
            }
            Checked::Done(HoldOutcome::Reserved(reservation)) => {
                info!(
                    hold_id = %hold_id,
                    reservation_id = %reservation.id,
                    shares = reservation.shares,
                    expires_at = %reservation.expires_at,
                    "hold converted to reservation"
                );
                Ok(HoldOutcome::Reserved(reservation))
            }
            Checked::Expired => {
                info!(hold_id = %hold_id, %party, "confirmation arrived after hold expiry");
                Err(FracshareError::HoldExpired(hold_id))
            }
        }
    }

    pub async fn cancel_hold(&self, caller: UserId, hold_id: HoldId) -> Result<BuyerHold> {
        self.cancel_hold_at(caller, hold_id, Utc::now()).await
    }

    /// Release a hold before both parties confirmed. No wallet effects.
    ///
    /// # Errors
    /// - `NotParticipant` if `caller` is neither buyer nor seller
    /// - `StateConflict` if the hold is already released, expired or converted
    pub async fn cancel_hold_at(
        &self,
        caller: UserId,
        hold_id: HoldId,
        now: DateTime<Utc>,
    ) -> Result<BuyerHold> {
        let hold = self
            .ledger
            .transaction(|txn| {
                let mut hold = txn.require_hold(hold_id)?;
                if hold.party_of(caller).is_none() {
                    return Err(FracshareError::NotParticipant {
                        reason: format!("user {caller} is not a party to hold {hold_id}"),
                    });
                }
                hold.mark_released(now)?;
                let mut order = txn.require_order(hold.order_id)?;
                order.release_hold(hold.shares, now)?;
                txn.put_order(order);
                txn.put_hold(hold.clone());
                Ok(hold)
            })
            .await?;

        info!(hold_id = %hold_id, shares = hold.shares, "hold cancelled");
        Ok(hold)
    }

    pub async fn admin_settle_reservation(
        &self,
        reservation_id: ReservationId,
        success: bool,
        notes: Option<String>,
    ) -> Result<ReservationSettlement> {
        self.admin_settle_reservation_at(reservation_id, success, notes, Utc::now())
            .await
    }

    /// Record the outcome of a reservation's offline settlement.
    ///
    /// On success the buyer pays the reservation's terms exactly as an
    /// instant buy would and the reservation completes with the trade id.
    /// On failure the shares return to the order's available pool.
    ///
    /// # Errors
    /// - `ReservationNotFound`
    /// - `ReservationExpired` if its deadline passed (the expiry is committed)
    ///   or the sweeper already expired it
    /// - `StateConflict` if the reservation was completed or cancelled
    /// - `InsufficientBalance` if the buyer cannot pay
    pub async fn admin_settle_reservation_at(
        &self,
        reservation_id: ReservationId,
        success: bool,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReservationSettlement> {
        let step = self
            .ledger
            .transaction(|txn| {
                let mut reservation = txn.require_reservation(reservation_id)?;
                if reservation.status == ReservationStatus::Expired {
                    return Err(FracshareError::ReservationExpired(reservation_id));
                }
                if reservation.status != ReservationStatus::Active {
                    return Err(FracshareError::StateConflict {
                        reason: format!(
                            "reservation {reservation_id} is {}, not ACTIVE",
                            reservation.status
                        ),
                    });
                }
                if reservation.is_expired_at(now) {
                    expire_reservation(txn, &mut reservation, now)?;
                    return Ok(Checked::Expired);
                }

                let mut order = txn.require_order(reservation.order_id)?;
                let receipt = if success {
                    let terms = TradeTerms {
                        trade_id: TradeId::for_reservation(reservation_id),
                        buyer_id: reservation.buyer_id,
                        shares: reservation.shares,
                        price_per_share: reservation.price_per_share,
                        source: TradeSource::Reservation(reservation_id),
                    };
                    let receipt = apply_trade(txn, &mut order, &terms, self.fee_rate, now)?;
                    reservation.mark_completed(terms.trade_id, now)?;
                    Some(receipt)
                } else {
                    order.release_reservation(reservation.shares, now)?;
                    txn.put_order(order);
                    reservation.mark_cancelled(now)?;
                    None
                };
                reservation.admin_notes = notes;
                txn.put_reservation(reservation.clone());
                Ok(Checked::Done(ReservationSettlement {
                    reservation,
                    receipt,
                }))
            })
            .await?;

        let settlement = match step {
            Checked::Done(settlement) => settlement,
            Checked::Expired => {
                info!(reservation_id = %reservation_id, "settlement arrived after reservation expiry");
                return Err(FracshareError::ReservationExpired(reservation_id));
            }
        };
        if let Some(receipt) = &settlement.receipt {
            info!(
                reservation_id = %reservation_id,
                trade_id = %receipt.trade.id,
                gross = %receipt.trade.gross_amount,
                fee = %receipt.trade.fee_amount,
                "reservation settled"
            );
            self.observer.trade_settled(&receipt.trade);
        } else {
            info!(reservation_id = %reservation_id, "reservation settlement failed; shares released");
        }
        Ok(settlement)
    }

    pub async fn get_hold(&self, hold_id: HoldId) -> Result<BuyerHold> {
        self.ledger.read(|v| v.require_hold(hold_id)).await
    }

    pub async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.ledger
            .read(|v| v.require_reservation(reservation_id))
            .await
    }

    /// Holds placed by `buyer`, newest first.
    pub async fn holds_for_buyer(&self, buyer: UserId) -> Vec<BuyerHold> {
        self.ledger
            .read(|v| {
                let mut holds: Vec<BuyerHold> =
                    v.holds().into_iter().filter(|h| h.buyer_id == buyer).collect();
                holds.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                holds
            })
            .await
    }
}
