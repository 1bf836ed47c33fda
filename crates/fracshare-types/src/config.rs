//! Configuration for the trading core.
//!
//! Everything the source system read from ambient settings (fee rate,
//! window lengths) is an explicit value here and is injected into the
//! engines at construction time.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{FracshareError, Result, constants};

/// Tunables for settlement, holds, idempotency and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Fraction of the gross amount kept by the platform, in `[0, 1)`.
    pub platform_fee_rate: Decimal,
    /// Lifetime of a fresh hold awaiting the first confirmation.
    pub buyer_hold_ttl_secs: u64,
    /// Lifetime of a hold once one side has confirmed.
    pub confirmation_ttl_secs: u64,
    /// Lifetime of a reservation awaiting admin settlement.
    pub reservation_ttl_secs: u64,
    /// Retention window of completed idempotency entries.
    pub idempotency_retention_secs: u64,
    /// Age after which an in-flight claim is considered abandoned.
    pub inflight_timeout_secs: u64,
    /// Background sweep period.
    pub sweep_interval_secs: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(constants::DEFAULT_PLATFORM_FEE_BPS, 4),
            buyer_hold_ttl_secs: constants::DEFAULT_BUYER_HOLD_TTL_SECS,
            confirmation_ttl_secs: constants::DEFAULT_CONFIRMATION_TTL_SECS,
            reservation_ttl_secs: constants::DEFAULT_RESERVATION_TTL_SECS,
            idempotency_retention_secs: constants::DEFAULT_IDEMPOTENCY_RETENTION_SECS,
            inflight_timeout_secs: constants::DEFAULT_INFLIGHT_TIMEOUT_SECS,
            sweep_interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl TradingConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| FracshareError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject values the engines cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.platform_fee_rate.is_sign_negative() || self.platform_fee_rate >= Decimal::ONE {
            return Err(FracshareError::Configuration(format!(
                "platform_fee_rate must be in [0, 1), got {}",
                self.platform_fee_rate
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(FracshareError::Configuration(
                "sweep_interval_secs must be > 0".to_string(),
            ));
        }
        for (name, value) in [
            ("buyer_hold_ttl_secs", self.buyer_hold_ttl_secs),
            ("confirmation_ttl_secs", self.confirmation_ttl_secs),
            ("reservation_ttl_secs", self.reservation_ttl_secs),
            ("idempotency_retention_secs", self.idempotency_retention_secs),
            ("inflight_timeout_secs", self.inflight_timeout_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if value > constants::MAX_WINDOW_SECS {
                return Err(FracshareError::Configuration(format!(
                    "{name} must be <= {}, got {value}",
                    constants::MAX_WINDOW_SECS
                )));
            }
        }
        if self.idempotency_retention_secs <= self.inflight_timeout_secs {
            return Err(FracshareError::Configuration(
                "idempotency_retention_secs must exceed inflight_timeout_secs".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn buyer_hold_ttl(&self) -> Duration {
        secs(self.buyer_hold_ttl_secs)
    }

    #[must_use]
    pub fn confirmation_ttl(&self) -> Duration {
        secs(self.confirmation_ttl_secs)
    }

    #[must_use]
    pub fn reservation_ttl(&self) -> Duration {
        secs(self.reservation_ttl_secs)
    }

    #[must_use]
    pub fn idempotency_retention(&self) -> Duration {
        secs(self.idempotency_retention_secs)
    }

    #[must_use]
    pub fn inflight_timeout(&self) -> Duration {
        secs(self.inflight_timeout_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

/// `now + window`, or a configuration error when the sum leaves chrono's range.
pub fn deadline_after(now: DateTime<Utc>, window: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(window).ok_or_else(|| {
        FracshareError::Configuration(format!("window of {window} from {now} is out of range"))
    })
}

fn secs(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
