//! Globally unique identifiers used throughout FracShare.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! [`TransactionToken`] is an opaque client-supplied string.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Entity ids
// ---------------------------------------------------------------------------

uuid_id!(
    /// Sell order identifier. Time-ordered, so newer orders sort later.
    OrderId,
    ""
);

uuid_id!(
    /// A user / wallet owner.
    UserId,
    ""
);

uuid_id!(
    /// A property whose fractional shares are traded.
    PropertyId,
    "prop:"
);

uuid_id!(
    /// A buyer hold placed against a sell order.
    HoldId,
    "hold:"
);

uuid_id!(
    /// A reservation created from a fully confirmed hold.
    ReservationId,
    "resv:"
);

// ---------------------------------------------------------------------------
// TradeId
// ---------------------------------------------------------------------------

/// Globally unique trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TradeId(pub Uuid);

impl TradeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Deterministic `TradeId` for an instant buy, derived from its
    /// transaction token and the time the token was claimed. A token reused
    /// after retention is a new claim and names a new trade.
    #[must_use]
    pub fn for_claim(token: &TransactionToken, claimed_at: DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"fracshare:trade_id:v2:");
        hasher.update(token.as_str().as_bytes());
        hasher.update(claimed_at.timestamp().to_be_bytes());
        hasher.update(claimed_at.timestamp_subsec_nanos().to_be_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }

    /// Deterministic `TradeId` for the settlement of a reservation.
    #[must_use]
    pub fn for_reservation(reservation_id: ReservationId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"fracshare:trade_id:reservation:v1:");
        hasher.update(reservation_id.0.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TransactionToken
// ---------------------------------------------------------------------------

/// Client-supplied idempotency token. One token per logical trade attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionToken(String);

impl TransactionToken {
    /// Wrap a caller-provided token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Server-side token for callers that did not supply one.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("gen-{}", Uuid::now_v7()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TransactionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}
