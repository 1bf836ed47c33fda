//! System-wide constants for the FracShare trading core.

/// Decimal places kept for wallet amounts (cents).
pub const MONEY_PRECISION: u32 = 2;

/// Default platform fee taken from the seller's proceeds, in basis points.
pub const DEFAULT_PLATFORM_FEE_BPS: i64 = 250;

/// Buyer hold lifetime before any confirmation (seconds).
pub const DEFAULT_BUYER_HOLD_TTL_SECS: u64 = 600;

/// Window for the counterparty to confirm once one side has (seconds).
pub const DEFAULT_CONFIRMATION_TTL_SECS: u64 = 3_600;

/// Reservation lifetime awaiting offline settlement (48h).
pub const DEFAULT_RESERVATION_TTL_SECS: u64 = 172_800;

/// How long a completed idempotency entry is honoured (24h).
pub const DEFAULT_IDEMPOTENCY_RETENTION_SECS: u64 = 86_400;

/// An in-flight claim older than this is treated as abandoned.
pub const DEFAULT_INFLIGHT_TIMEOUT_SECS: u64 = 30;

/// Period of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Upper bound on any configured window (10 years).
pub const MAX_WINDOW_SECS: u64 = 315_360_000;

/// Longest accepted idempotency token.
pub const MAX_TOKEN_LEN: usize = 128;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "FracShare";
