//! In-memory reference store.
//!
//! One `tokio::sync::Mutex` guards the whole ledger, so a transaction holds
//! exclusive access from its first read to its commit. That is stronger
//! than serializable isolation and is what the engines rely on. Writes are
//! applied in place and journaled in an undo log; rollback replays the log
//! backwards. A transaction dropped without commit (an `Err` or a panic
//! inside the closure) rolls back.

use std::collections::HashMap;
use std::hash::Hash;

use fracshare_types::{
    BuyerHold, FracshareError, HoldId, IdempotencyEntry, OrderId, PropertyId, Reservation,
    ReservationId, Result, SellOrder, Trade, TransactionToken, UserId,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::store::{LedgerStore, LedgerTxn, LedgerView};
use crate::supply_conservation::SupplyConservation;

/// Every row the trading core reads or writes.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    wallets: HashMap<UserId, Decimal>,
    shares: HashMap<(UserId, PropertyId), u64>,
    revenue: Decimal,
    orders: HashMap<OrderId, SellOrder>,
    holds: HashMap<HoldId, BuyerHold>,
    reservations: HashMap<ReservationId, Reservation>,
    trades: Vec<Trade>,
    idempotency: HashMap<TransactionToken, IdempotencyEntry>,
    supply: SupplyConservation,
}

impl LedgerView for LedgerState {
    fn wallet_balance(&self, user: UserId) -> Decimal {
        self.wallets.get(&user).copied().unwrap_or(Decimal::ZERO)
    }

    fn share_balance(&self, user: UserId, property: PropertyId) -> u64 {
        self.shares.get(&(user, property)).copied().unwrap_or(0)
    }

    fn platform_revenue(&self) -> Decimal {
        self.revenue
    }

    fn total_wallet_balance(&self) -> Decimal {
        self.wallets.values().copied().sum()
    }

    fn total_shares_owned(&self, property: PropertyId) -> u64 {
        self.shares
            .iter()
            .filter(|((_, p), _)| *p == property)
            .map(|(_, n)| *n)
            .sum()
    }

    fn order(&self, id: OrderId) -> Option<SellOrder> {
        self.orders.get(&id).cloned()
    }

    fn orders(&self) -> Vec<SellOrder> {
        self.orders.values().cloned().collect()
    }

    fn hold(&self, id: HoldId) -> Option<BuyerHold> {
        self.holds.get(&id).cloned()
    }

    fn holds(&self) -> Vec<BuyerHold> {
        self.holds.values().cloned().collect()
    }

    fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.reservations.get(&id).cloned()
    }

    fn reservations(&self) -> Vec<Reservation> {
        self.reservations.values().cloned().collect()
    }

    fn trades(&self) -> Vec<Trade> {
        self.trades.clone()
    }

    fn idempotency_entry(&self, token: &TransactionToken) -> Option<IdempotencyEntry> {
        self.idempotency.get(token).cloned()
    }

    fn idempotency_entries(&self) -> Vec<IdempotencyEntry> {
        self.idempotency.values().cloned().collect()
    }
}

/// Prior value of a row, restored on rollback.
enum Undo {
    Wallet(UserId, Option<Decimal>),
    Shares((UserId, PropertyId), Option<u64>),
    Revenue(Decimal),
    Order(OrderId, Option<SellOrder>),
    Hold(HoldId, Option<BuyerHold>),
    Reservation(ReservationId, Option<Reservation>),
    Trade,
    Idempotency(TransactionToken, Option<IdempotencyEntry>),
}

fn restore<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

/// An open transaction over a locked [`LedgerState`].
pub struct MemoryTxn<'a> {
    state: &'a mut LedgerState,
    undo: Vec<Undo>,
    committed: bool,
}

impl<'a> MemoryTxn<'a> {
    fn begin(state: &'a mut LedgerState) -> Self {
        Self {
            state,
            undo: Vec::new(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
        self.undo.clear();
    }

    fn rollback(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Wallet(k, v) => restore(&mut self.state.wallets, k, v),
                Undo::Shares(k, v) => restore(&mut self.state.shares, k, v),
                Undo::Revenue(v) => self.state.revenue = v,
                Undo::Order(k, v) => restore(&mut self.state.orders, k, v),
                Undo::Hold(k, v) => restore(&mut self.state.holds, k, v),
                Undo::Reservation(k, v) => restore(&mut self.state.reservations, k, v),
                Undo::Trade => {
                    self.state.trades.pop();
                }
                Undo::Idempotency(k, v) => restore(&mut self.state.idempotency, k, v),
            }
        }
    }
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.undo.is_empty() {
            tracing::debug!(writes = self.undo.len(), "rolling back ledger transaction");
            self.rollback();
        }
    }
}

impl LedgerView for MemoryTxn<'_> {
    fn wallet_balance(&self, user: UserId) -> Decimal {
        self.state.wallet_balance(user)
    }

    fn share_balance(&self, user: UserId, property: PropertyId) -> u64 {
        self.state.share_balance(user, property)
    }

    fn platform_revenue(&self) -> Decimal {
        self.state.platform_revenue()
    }

    fn total_wallet_balance(&self) -> Decimal {
        self.state.total_wallet_balance()
    }

    fn total_shares_owned(&self, property: PropertyId) -> u64 {
        self.state.total_shares_owned(property)
    }

    fn order(&self, id: OrderId) -> Option<SellOrder> {
        self.state.order(id)
    }

    fn orders(&self) -> Vec<SellOrder> {
        self.state.orders()
    }

    fn hold(&self, id: HoldId) -> Option<BuyerHold> {
        self.state.hold(id)
    }

    fn holds(&self) -> Vec<BuyerHold> {
        self.state.holds()
    }

    fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.state.reservation(id)
    }

    fn reservations(&self) -> Vec<Reservation> {
        self.state.reservations()
    }

    fn trades(&self) -> Vec<Trade> {
        self.state.trades()
    }

    fn idempotency_entry(&self, token: &TransactionToken) -> Option<IdempotencyEntry> {
        self.state.idempotency_entry(token)
    }

    fn idempotency_entries(&self) -> Vec<IdempotencyEntry> {
        self.state.idempotency_entries()
    }
}

impl LedgerTxn for MemoryTxn<'_> {
    fn set_wallet_balance(&mut self, user: UserId, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(FracshareError::BalanceUnderflow);
        }
        let prior = self.state.wallets.insert(user, amount);
        self.undo.push(Undo::Wallet(user, prior));
        Ok(())
    }

    fn set_share_balance(&mut self, user: UserId, property: PropertyId, shares: u64) {
        let key = (user, property);
        let prior = self.state.shares.insert(key, shares);
        self.undo.push(Undo::Shares(key, prior));
    }

    fn add_platform_revenue(&mut self, amount: Decimal) {
        self.undo.push(Undo::Revenue(self.state.revenue));
        self.state.revenue += amount;
    }

    fn put_order(&mut self, order: SellOrder) {
        let id = order.id;
        let prior = self.state.orders.insert(id, order);
        self.undo.push(Undo::Order(id, prior));
    }

    fn put_hold(&mut self, hold: BuyerHold) {
        let id = hold.id;
        let prior = self.state.holds.insert(id, hold);
        self.undo.push(Undo::Hold(id, prior));
    }

    fn put_reservation(&mut self, reservation: Reservation) {
        let id = reservation.id;
        let prior = self.state.reservations.insert(id, reservation);
        self.undo.push(Undo::Reservation(id, prior));
    }

    fn append_trade(&mut self, trade: Trade) {
        self.state.trades.push(trade);
        self.undo.push(Undo::Trade);
    }

    fn put_idempotency_entry(&mut self, entry: IdempotencyEntry) {
        let token = entry.token.clone();
        let prior = self.state.idempotency.insert(token.clone(), entry);
        self.undo.push(Undo::Idempotency(token, prior));
    }

    fn remove_idempotency_entry(&mut self, token: &TransactionToken) {
        if let Some(prior) = self.state.idempotency.remove(token) {
            self.undo.push(Undo::Idempotency(token.clone(), Some(prior)));
        }
    }
}

/// The reference [`LedgerStore`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fund a wallet from outside the trading core.
    pub async fn deposit(&self, user: UserId, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(FracshareError::InvalidRequest {
                reason: format!("deposit must be positive, got {amount}"),
            });
        }
        let mut state = self.state.lock().await;
        // Every wallet and the revenue row are bounded by the total deposited.
        state.supply.record_deposit(amount)?;
        *state.wallets.entry(user).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    /// Pay cash out of a wallet to outside the trading core.
    pub async fn withdraw(&self, user: UserId, amount: Decimal) -> Result<()> {
        let mut state = self.state.lock().await;
        let available = state.wallet_balance(user);
        if amount <= Decimal::ZERO || available < amount {
            return Err(FracshareError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        state.wallets.insert(user, available - amount);
        state.supply.record_withdrawal(amount);
        Ok(())
    }

    /// Issue new shares of a property to a user (primary offering).
    pub async fn issue_shares(&self, user: UserId, property: PropertyId, shares: u64) {
        let mut state = self.state.lock().await;
        *state.shares.entry((user, property)).or_insert(0) += shares;
        state.supply.record_issue(property, shares);
    }

    /// Check cash and share conservation against recorded inflows.
    ///
    /// # Errors
    /// [`FracshareError::SupplyInvariantViolation`] naming the broken sum.
    pub async fn audit(&self) -> Result<()> {
        let state = self.state.lock().await;
        state
            .supply
            .verify_cash(state.total_wallet_balance() + state.revenue)?;
        for property in state.supply.tracked_properties() {
            let listed: u64 = state
                .orders
                .values()
                .filter(|o| o.property_id == property && o.status.is_open())
                .map(|o| o.remaining_shares)
                .sum();
            state
                .supply
                .verify_shares(property, state.total_shares_owned(property) + listed)?;
        }
        Ok(())
    }
}

impl LedgerStore for MemoryLedger {
    async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut dyn LedgerTxn) -> Result<T> + Send,
    {
        let mut state = self.state.lock().await;
        let mut txn = MemoryTxn::begin(&mut state);
        let outcome = f(&mut txn);
        if outcome.is_ok() {
            txn.commit();
        }
        // On error `txn` drops here and rolls back.
        outcome
    }

    async fn read<T, F>(&self, f: F) -> T
    where
        T: Send,
        F: FnOnce(&dyn LedgerView) -> T + Send,
    {
        let state = self.state.lock().await;
        f(&*state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ledger() -> MemoryLedger {
        MemoryLedger::new()
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.deposit(user, Decimal::new(1000, 0)).await.unwrap();

        let after = ledger
            .transaction(|txn| txn.debit_wallet(user, Decimal::new(400, 0)))
            .await
            .unwrap();
        assert_eq!(after, Decimal::new(600, 0));
        let bal = ledger.read(|v| v.wallet_balance(user)).await;
        assert_eq!(bal, Decimal::new(600, 0));
    }

    #[tokio::test]
    async fn oversized_cash_is_refused_not_wrapped() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.deposit(user, Decimal::MAX).await.unwrap();
        let err = ledger.deposit(UserId::new(), Decimal::ONE).await.unwrap_err();
        assert!(matches!(err, FracshareError::InvalidRequest { .. }));

        let err = ledger
            .transaction(|txn| txn.credit_wallet(user, Decimal::ONE))
            .await
            .unwrap_err();
        assert!(matches!(err, FracshareError::Internal(_)));
        assert_eq!(ledger.read(|v| v.wallet_balance(user)).await, Decimal::MAX);
        ledger.audit().await.unwrap();
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back_every_write() {
        let ledger = ledger();
        let buyer = UserId::new();
        let seller = UserId::new();
        let property = PropertyId::new();
        ledger.deposit(buyer, Decimal::new(100, 0)).await.unwrap();
        ledger.issue_shares(seller, property, 10).await;
        let order = SellOrder::dummy(seller, 10, Decimal::new(10, 0));
        let order_id = order.id;

        let err = ledger
            .transaction(|txn| {
                txn.put_order(order.clone());
                txn.credit_shares(buyer, property, 3)?;
                txn.debit_wallet(buyer, Decimal::new(30, 0))?;
                txn.add_platform_revenue(Decimal::ONE);
                // Second debit exceeds what is left.
                txn.debit_wallet(buyer, Decimal::new(80, 0))?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FracshareError::InsufficientBalance { .. }));

        ledger
            .read(|v| {
                assert_eq!(v.wallet_balance(buyer), Decimal::new(100, 0));
                assert_eq!(v.share_balance(buyer, property), 0);
                assert_eq!(v.platform_revenue(), Decimal::ZERO);
                assert!(v.order(order_id).is_none());
            })
            .await;
        ledger.audit().await.unwrap();
    }

    #[tokio::test]
    async fn negative_balance_rejected() {
        let ledger = ledger();
        let user = UserId::new();
        let err = ledger
            .transaction(|txn| txn.set_wallet_balance(user, Decimal::new(-1, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, FracshareError::BalanceUnderflow));
    }

    #[tokio::test]
    async fn debit_shares_insufficient() {
        let ledger = ledger();
        let user = UserId::new();
        let property = PropertyId::new();
        ledger.issue_shares(user, property, 2).await;
        let err = ledger
            .transaction(|txn| txn.debit_shares(user, property, 3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FracshareError::InsufficientShares {
                requested: 3,
                available: 2
            }
        ));
    }

    #[tokio::test]
    async fn idempotency_rows_roll_back_too() {
        let ledger = ledger();
        let token = TransactionToken::new("t-1");
        let entry = IdempotencyEntry::in_flight(
            token.clone(),
            fracshare_types::RequestFingerprint::instant_buy(UserId::new(), OrderId::new(), 1),
            Utc::now(),
        );
        ledger
            .transaction(|txn| {
                txn.put_idempotency_entry(entry.clone());
                Ok(())
            })
            .await
            .unwrap();

        let _ = ledger
            .transaction(|txn| {
                txn.remove_idempotency_entry(&token);
                Err::<(), _>(FracshareError::Internal("abort".into()))
            })
            .await;
        assert!(ledger.read(|v| v.idempotency_entry(&token)).await.is_some());
    }

    #[tokio::test]
    async fn audit_detects_share_drift() {
        let ledger = ledger();
        let user = UserId::new();
        let property = PropertyId::new();
        ledger.issue_shares(user, property, 5).await;
        ledger.audit().await.unwrap();

        ledger
            .transaction(|txn| {
                txn.set_share_balance(user, property, 6);
                Ok(())
            })
            .await
            .unwrap();
        let err = ledger.audit().await.unwrap_err();
        assert!(matches!(
            err,
            FracshareError::SupplyInvariantViolation { .. }
        ));
    }

    #[tokio::test]
    async fn withdraw_tracks_supply() {
        let ledger = ledger();
        let user = UserId::new();
        ledger.deposit(user, Decimal::new(50, 0)).await.unwrap();
        ledger.withdraw(user, Decimal::new(20, 0)).await.unwrap();
        assert!(ledger.withdraw(user, Decimal::new(31, 0)).await.is_err());
        ledger.audit().await.unwrap();
    }
}
