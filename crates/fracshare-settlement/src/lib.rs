//! # fracshare-settlement
//!
//! **Instant settlement**: the order registry, the idempotency guard and the
//! atomic instant-buy transaction.
//!
//! ## Architecture
//!
//! Every mutation runs inside one [`LedgerStore`](fracshare_ledger::LedgerStore)
//! transaction. An instant buy:
//! 1. Claims its transaction token ([`IdempotencyGuard`])
//! 2. Re-checks the order, share count, parties, gate and buyer funds
//! 3. Moves cash and shares via [`apply_trade`]
//! 4. Caches the receipt under the token in the same transaction
//! 5. Notifies the [`TradeObserver`] after commit
//!
//! [`apply_trade`] is shared with the escrow crate, which settles confirmed
//! reservations with the same ledger effects.

pub mod engine;
pub mod gate;
pub mod idempotency;
pub mod registry;

pub use engine::{InstantBuyRequest, SettlementEngine, TradeTerms, apply_trade};
pub use gate::{AllowAllGate, ChannelObserver, NoopObserver, PropertyGate, TradeObserver, TradingGate};
pub use idempotency::{Claim, IdempotencyGuard};
pub use registry::{NewSellOrder, OrderRegistry, active_orders, ensure_tradable, ensure_trading_enabled};
