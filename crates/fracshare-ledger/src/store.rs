//! The transaction boundary every settlement runs inside.
//!
//! The trading core does not implement a storage engine. It states what it
//! needs from one:
//!
//! - [`LedgerView`]: consistent reads of wallets, ownership and order rows
//! - [`LedgerTxn`]: row writes that either all commit or all roll back
//! - [`LedgerStore`]: runs a closure as one serializable transaction
//!
//! A closure returning `Err` must leave no trace. The engines perform every
//! precondition check inside the closure, so a check and the write it
//! guards can never be separated by another transaction.

use std::future::Future;

use fracshare_types::{
    BuyerHold, FracshareError, HoldId, IdempotencyEntry, OrderId, PropertyId, Reservation,
    ReservationId, Result, SellOrder, Trade, TransactionToken, UserId,
};
use rust_decimal::Decimal;

/// Read access to ledger rows.
pub trait LedgerView {
    /// Available cash of a user. Unknown users have zero.
    fn wallet_balance(&self, user: UserId) -> Decimal;

    /// Shares of `property` owned by `user`.
    fn share_balance(&self, user: UserId, property: PropertyId) -> u64;

    /// Fees collected so far.
    fn platform_revenue(&self) -> Decimal;

    /// Sum of every wallet.
    fn total_wallet_balance(&self) -> Decimal;

    /// Shares of `property` held across all ownership records.
    fn total_shares_owned(&self, property: PropertyId) -> u64;

    fn order(&self, id: OrderId) -> Option<SellOrder>;

    fn orders(&self) -> Vec<SellOrder>;

    fn hold(&self, id: HoldId) -> Option<BuyerHold>;

    fn holds(&self) -> Vec<BuyerHold>;

    fn reservation(&self, id: ReservationId) -> Option<Reservation>;

    fn reservations(&self) -> Vec<Reservation>;

    fn trades(&self) -> Vec<Trade>;

    fn idempotency_entry(&self, token: &TransactionToken) -> Option<IdempotencyEntry>;

    fn idempotency_entries(&self) -> Vec<IdempotencyEntry>;

    /// Like [`order`](Self::order) but a missing row is an error.
    fn require_order(&self, id: OrderId) -> Result<SellOrder> {
        self.order(id).ok_or(FracshareError::OrderNotFound(id))
    }

    fn require_hold(&self, id: HoldId) -> Result<BuyerHold> {
        self.hold(id).ok_or(FracshareError::HoldNotFound(id))
    }

    fn require_reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.reservation(id)
            .ok_or(FracshareError::ReservationNotFound(id))
    }
}

/// Writes inside an open transaction.
pub trait LedgerTxn: LedgerView {
    /// Overwrite a wallet. Negative values are rejected.
    fn set_wallet_balance(&mut self, user: UserId, amount: Decimal) -> Result<()>;

    fn set_share_balance(&mut self, user: UserId, property: PropertyId, shares: u64);

    fn add_platform_revenue(&mut self, amount: Decimal);

    fn put_order(&mut self, order: SellOrder);

    fn put_hold(&mut self, hold: BuyerHold);

    fn put_reservation(&mut self, reservation: Reservation);

    fn append_trade(&mut self, trade: Trade);

    fn put_idempotency_entry(&mut self, entry: IdempotencyEntry);

    fn remove_idempotency_entry(&mut self, token: &TransactionToken);

    /// Take `amount` from a wallet. Returns the new balance.
    ///
    /// # Errors
    /// `InsufficientBalance` if the wallet holds less than `amount`.
    fn debit_wallet(&mut self, user: UserId, amount: Decimal) -> Result<Decimal> {
        let available = self.wallet_balance(user);
        if available < amount {
            return Err(FracshareError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        let next = available - amount;
        self.set_wallet_balance(user, next)?;
        Ok(next)
    }

    /// Add `amount` to a wallet. Returns the new balance.
    fn credit_wallet(&mut self, user: UserId, amount: Decimal) -> Result<Decimal> {
        let next = self
            .wallet_balance(user)
            .checked_add(amount)
            .ok_or_else(|| FracshareError::Internal("wallet balance overflow".to_string()))?;
        self.set_wallet_balance(user, next)?;
        Ok(next)
    }

    /// Take shares from an ownership record. Returns the new count.
    ///
    /// # Errors
    /// `InsufficientShares` if the user owns fewer than `shares`.
    fn debit_shares(&mut self, user: UserId, property: PropertyId, shares: u64) -> Result<u64> {
        let owned = self.share_balance(user, property);
        let next = owned
            .checked_sub(shares)
            .ok_or(FracshareError::InsufficientShares {
                requested: shares,
                available: owned,
            })?;
        self.set_share_balance(user, property, next);
        Ok(next)
    }

    /// Add shares to an ownership record. Returns the new count.
    fn credit_shares(&mut self, user: UserId, property: PropertyId, shares: u64) -> Result<u64> {
        let next = self
            .share_balance(user, property)
            .checked_add(shares)
            .ok_or_else(|| FracshareError::Internal("share count overflow".to_string()))?;
        self.set_share_balance(user, property, next);
        Ok(next)
    }
}

/// A store able to run serializable multi-row transactions.
pub trait LedgerStore: Send + Sync {
    /// Run `f` as one transaction: commit on `Ok`, roll back every write on `Err`.
    fn transaction<T, F>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        T: Send,
        F: FnOnce(&mut dyn LedgerTxn) -> Result<T> + Send;

    /// Run `f` against a consistent snapshot.
    fn read<T, F>(&self, f: F) -> impl Future<Output = T> + Send
    where
        T: Send,
        F: FnOnce(&dyn LedgerView) -> T + Send;
}
