//! Supply conservation invariant checker.
//!
//! Two invariants hold after every committed transaction:
//! ```text
//! cash:            Σ wallets + platform revenue == Σ deposits − Σ withdrawals
//! shares, ∀ prop:  Σ ownership(prop) + Σ remaining(open orders of prop) == issued(prop)
//! ```
//!
//! Trading only moves cash and shares between rows. If either sum drifts,
//! something has created or destroyed value and the ledger must stop.

use std::collections::HashMap;

use fracshare_types::{FracshareError, PropertyId, Result};
use rust_decimal::Decimal;

/// Tracks what entered and left the ledger from outside the trading core.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    deposits: Decimal,
    withdrawals: Decimal,
    issued: HashMap<PropertyId, u64>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record cash entering a wallet from outside.
    ///
    /// # Errors
    /// `InvalidRequest` if the running total would leave the representable range.
    pub fn record_deposit(&mut self, amount: Decimal) -> Result<()> {
        self.deposits = self
            .deposits
            .checked_add(amount)
            .ok_or_else(|| FracshareError::InvalidRequest {
                reason: format!("deposit of {amount} exceeds the representable total"),
            })?;
        Ok(())
    }

    /// Record cash leaving a wallet to outside.
    pub fn record_withdrawal(&mut self, amount: Decimal) {
        self.withdrawals += amount;
    }

    /// Record newly issued shares of a property.
    pub fn record_issue(&mut self, property: PropertyId, shares: u64) {
        *self.issued.entry(property).or_insert(0) += shares;
    }

    /// Cash that should exist across wallets and revenue.
    #[must_use]
    pub fn expected_cash(&self) -> Decimal {
        self.deposits - self.withdrawals
    }

    /// Shares that should exist for `property`.
    #[must_use]
    pub fn issued_shares(&self, property: PropertyId) -> u64 {
        self.issued.get(&property).copied().unwrap_or(0)
    }

    /// Every property ever issued.
    #[must_use]
    pub fn tracked_properties(&self) -> Vec<PropertyId> {
        self.issued.keys().copied().collect()
    }

    /// # Errors
    /// [`FracshareError::SupplyInvariantViolation`] if `actual` ≠ expected.
    pub fn verify_cash(&self, actual: Decimal) -> Result<()> {
        let expected = self.expected_cash();
        if actual != expected {
            return Err(FracshareError::SupplyInvariantViolation {
                reason: format!(
                    "cash: actual {actual} != expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.deposits, self.withdrawals
                ),
            });
        }
        Ok(())
    }

    /// # Errors
    /// [`FracshareError::SupplyInvariantViolation`] if `actual` ≠ issued.
    pub fn verify_shares(&self, property: PropertyId, actual: u64) -> Result<()> {
        let expected = self.issued_shares(property);
        if actual != expected {
            return Err(FracshareError::SupplyInvariantViolation {
                reason: format!("property {property}: actual shares {actual} != issued {expected}"),
            });
        }
        Ok(())
    }
}
