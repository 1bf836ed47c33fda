//! Wiring: one ledger, the engines over it, and the background tasks.

use std::sync::Arc;

use fracshare_escrow::{EscrowManager, ExpirySweeper};
use fracshare_ledger::MemoryLedger;
use fracshare_settlement::{ChannelObserver, OrderRegistry, PropertyGate, SettlementEngine};
use fracshare_types::{Trade, TradingConfig};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

pub struct Node {
    pub config: TradingConfig,
    pub ledger: Arc<MemoryLedger>,
    pub gate: Arc<PropertyGate>,
    pub registry: OrderRegistry<MemoryLedger>,
    pub engine: Arc<SettlementEngine<MemoryLedger>>,
    pub escrow: EscrowManager<MemoryLedger>,
    pub sweeper: Arc<ExpirySweeper<MemoryLedger>>,
}

impl Node {
    /// Build every service over a fresh in-memory ledger. The returned
    /// receiver carries each settled trade.
    pub fn build(config: TradingConfig) -> (Self, mpsc::UnboundedReceiver<Trade>) {
        let ledger = Arc::new(MemoryLedger::new());
        let gate = Arc::new(PropertyGate::new());
        let (observer, trades) = ChannelObserver::channel();
        let observer = Arc::new(observer);

        let registry = OrderRegistry::new(Arc::clone(&ledger)).with_gate(gate.clone());
        let engine = SettlementEngine::new(Arc::clone(&ledger), &config)
            .with_gate(gate.clone())
            .with_observer(observer.clone());
        let escrow = EscrowManager::new(Arc::clone(&ledger), &config)
            .with_gate(gate.clone())
            .with_observer(observer);
        let sweeper = ExpirySweeper::new(Arc::clone(&ledger), &config);

        let node = Self {
            config,
            ledger,
            gate,
            registry,
            engine: Arc::new(engine),
            escrow,
            sweeper: Arc::new(sweeper),
        };
        (node, trades)
    }

    /// Start the periodic sweeper.
    pub fn spawn_sweeper(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        Arc::clone(&self.sweeper).spawn(self.config.sweep_interval(), shutdown)
    }
}

/// Drain settled trades. Tier recalculation lives outside this process;
/// each trade is logged as the trigger for both counterparties.
pub fn spawn_trade_listener(mut trades: mpsc::UnboundedReceiver<Trade>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut seen = 0;
        while let Some(trade) = trades.recv().await {
            seen += 1;
            info!(
                trade_id = %trade.id,
                buyer_id = %trade.buyer_id,
                seller_id = %trade.seller_id,
                gross = %trade.gross_amount,
                "tier recalculation requested"
            );
        }
        seen
    })
}
