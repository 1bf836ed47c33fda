//! Settlement idempotency guard: prevents double execution.
//!
//! Each client transaction token executes at most once. The guard keeps its
//! state in ledger rows so that the claim, the settlement and the cached
//! receipt share the store's transaction boundary:
//!
//! ```text
//!   absent ──claim──▶ IN_FLIGHT ──complete (same txn as settlement)──▶ COMPLETED
//!                        │                                               │
//!                        └──abandon (settlement failed)──▶ absent        └──retention──▶ pruned
//! ```
//!
//! A retry with the same token and the same request gets the cached receipt
//! back with `replayed = true`. The same token on a different request is
//! rejected, as is a retry racing the still-running original.

use chrono::{DateTime, Duration, Utc};
use fracshare_ledger::{LedgerStore, LedgerTxn};
use fracshare_types::{
    FracshareError, IdempotencyEntry, IdempotencyState, RequestFingerprint, Result,
    SettlementReceipt, TradingConfig, TransactionToken, constants,
};

/// What a claim decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns the token and must settle, then complete or abandon.
    Fresh,
    /// Already settled; here is the original outcome.
    Replay(Box<SettlementReceipt>),
}

/// Token lifecycle rules over the ledger's idempotency rows.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyGuard {
    retention: Duration,
    inflight_timeout: Duration,
}

impl IdempotencyGuard {
    #[must_use]
    pub fn new(retention: Duration, inflight_timeout: Duration) -> Self {
        Self {
            retention,
            inflight_timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &TradingConfig) -> Self {
        Self::new(config.idempotency_retention(), config.inflight_timeout())
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Reject tokens that cannot be stored as keys.
    pub fn validate_token(token: &TransactionToken) -> Result<()> {
        let len = token.as_str().len();
        if len == 0 || len > constants::MAX_TOKEN_LEN {
            return Err(FracshareError::InvalidRequest {
                reason: format!(
                    "transaction token must be 1..={} bytes, got {len}",
                    constants::MAX_TOKEN_LEN
                ),
            });
        }
        Ok(())
    }

    /// Decide what to do with `token` given its current row, and write the
    /// in-flight claim when the caller may proceed.
    pub fn check(
        &self,
        txn: &mut dyn LedgerTxn,
        token: &TransactionToken,
        fingerprint: RequestFingerprint,
        now: DateTime<Utc>,
    ) -> Result<Claim> {
        if let Some(entry) = txn.idempotency_entry(token) {
            if !entry.is_retired(now, self.retention) {
                match entry.state {
                    IdempotencyState::Completed if entry.fingerprint == fingerprint => {
                        if let Some(mut receipt) = entry.receipt {
                            receipt.replayed = true;
                            return Ok(Claim::Replay(Box::new(receipt)));
                        }
                        return Err(FracshareError::Internal(format!(
                            "completed token {token} has no cached receipt"
                        )));
                    }
                    IdempotencyState::Completed => {
                        return Err(FracshareError::DuplicateTransaction(token.clone()));
                    }
                    IdempotencyState::InFlight
                        if !entry.is_stale_claim(now, self.inflight_timeout) =>
                    {
                        return Err(FracshareError::ConcurrentTransaction(token.clone()));
                    }
                    IdempotencyState::InFlight => {
                        tracing::warn!(
                            token = %token,
                            claimed_at = %entry.updated_at,
                            "taking over stale in-flight claim"
                        );
                    }
                }
            }
        }
        txn.put_idempotency_entry(IdempotencyEntry::in_flight(token.clone(), fingerprint, now));
        Ok(Claim::Fresh)
    }

    /// Claim `token` in its own short transaction.
    pub async fn claim<L: LedgerStore>(
        &self,
        ledger: &L,
        token: &TransactionToken,
        fingerprint: RequestFingerprint,
        now: DateTime<Utc>,
    ) -> Result<Claim> {
        ledger
            .transaction(|txn| self.check(txn, token, fingerprint, now))
            .await
    }

    /// Mark the claim completed with `receipt`. Call inside the settlement
    /// transaction so the cached receipt commits with the trade.
    ///
    /// # Errors
    /// `ConcurrentTransaction` if the claim was taken over in the meantime.
    pub fn complete(
        &self,
        txn: &mut dyn LedgerTxn,
        token: &TransactionToken,
        fingerprint: RequestFingerprint,
        receipt: &SettlementReceipt,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut entry = match txn.idempotency_entry(token) {
            Some(e) if e.state == IdempotencyState::InFlight && e.fingerprint == fingerprint => e,
            _ => return Err(FracshareError::ConcurrentTransaction(token.clone())),
        };
        entry.state = IdempotencyState::Completed;
        entry.receipt = Some(receipt.clone());
        entry.updated_at = now;
        txn.put_idempotency_entry(entry);
        Ok(())
    }

    /// Drop an in-flight claim after a failed settlement so the client may
    /// retry with the same token.
    pub async fn abandon<L: LedgerStore>(&self, ledger: &L, token: &TransactionToken) {
        let outcome = ledger
            .transaction(|txn| {
                if txn
                    .idempotency_entry(token)
                    .is_some_and(|e| e.state == IdempotencyState::InFlight)
                {
                    txn.remove_idempotency_entry(token);
                }
                Ok(())
            })
            .await;
        if let Err(e) = outcome {
            tracing::warn!(token = %token, error = %e, "failed to abandon idempotency claim");
        }
    }

    /// Remove every row past retention. Returns how many were removed.
    pub fn prune(&self, txn: &mut dyn LedgerTxn, now: DateTime<Utc>) -> usize {
        let expired: Vec<TransactionToken> = txn
            .idempotency_entries()
            .into_iter()
            .filter(|e| e.is_retired(now, self.retention))
            .map(|e| e.token)
            .collect();
        for token in &expired {
            txn.remove_idempotency_entry(token);
        }
        expired.len()
    }
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::from_config(&TradingConfig::default())
    }
}
