//! Idempotency records for retried settlement requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{OrderId, SettlementReceipt, TransactionToken, UserId};

/// SHA-256 over the parameters of a request. A token replayed with a
/// different fingerprint is a misuse, not a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestFingerprint(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl RequestFingerprint {
    /// Fingerprint of an instant-buy request.
    #[must_use]
    pub fn instant_buy(buyer_id: UserId, order_id: OrderId, shares: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"fracshare:instant_buy:v1:");
        hasher.update(buyer_id.0.as_bytes());
        hasher.update(order_id.0.as_bytes());
        hasher.update(shares.to_le_bytes());
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

/// Where a token is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyState {
    /// Claimed by a request that has not committed yet.
    InFlight,
    /// Committed; the receipt is cached.
    Completed,
}

/// A transaction token mapped to the outcome of its first execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyEntry {
    pub token: TransactionToken,
    pub fingerprint: RequestFingerprint,
    pub state: IdempotencyState,
    pub receipt: Option<SettlementReceipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdempotencyEntry {
    /// A fresh in-flight claim.
    #[must_use]
    pub fn in_flight(
        token: TransactionToken,
        fingerprint: RequestFingerprint,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            fingerprint,
            state: IdempotencyState::InFlight,
            receipt: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Past the retention window; the token may be reused.
    #[must_use]
    pub fn is_retired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.created_at
            .checked_add_signed(retention)
            .is_some_and(|until| now >= until)
    }

    /// An in-flight claim whose owner is presumed dead.
    #[must_use]
    pub fn is_stale_claim(&self, now: DateTime<Utc>, inflight_timeout: Duration) -> bool {
        self.state == IdempotencyState::InFlight
            && self
                .updated_at
                .checked_add_signed(inflight_timeout)
                .is_some_and(|until| now >= until)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(d)?;
        let bytes = hex::decode(raw).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("fingerprint must be 32 bytes"))
    }
}
