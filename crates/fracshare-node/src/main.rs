//! FracShare node
//!
//! Hosts the trading core over an in-memory ledger:
//!
//! - `run`: serve until Ctrl-C with the expiry sweeper ticking in the background
//! - `demo`: replay the reference scenarios and audit the ledger
//! - `show-config`: print the effective configuration

mod common;
mod demo;
mod node;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use common::{Cli, Command};
use node::{Node, spawn_trade_listener};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    common::init_logging(&cli.log_level, cli.json)?;
    let config = common::load_config(cli.config.as_ref())?;

    match cli.command {
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Demo => {
            let (node, trades) = Node::build(config);
            let listener = spawn_trade_listener(trades);
            demo::run(&node).await?;
            drop(node);
            let seen = listener.await?;
            info!(trades = seen, "trade listener drained");
            Ok(())
        }
        Command::Run => serve(config).await,
    }
}

async fn serve(config: fracshare_types::TradingConfig) -> Result<()> {
    info!(
        fee_rate = %config.platform_fee_rate,
        sweep_interval_secs = config.sweep_interval_secs,
        "starting fracshare node"
    );
    let (node, trades) = Node::build(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = node.spawn_sweeper(shutdown_rx);
    let listener = spawn_trade_listener(trades);

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown_tx.send(true)?;
    sweeper.await?;

    // Dropping the engines closes the trade channel.
    drop(node);
    let seen = listener.await?;
    info!(trades = seen, "fracshare node stopped");
    Ok(())
}
