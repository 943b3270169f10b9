use precommit_batcher::{
    api::Server,
    batch::{BatchEngine, PreCommitBatcher},
    chain::MemoryChain,
    config::{Config, SharedConfig},
    funding::BalanceAddressSelector,
    Address, MinerInfo, NetworkVersion,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Entry point: runs the batcher against an in-memory devnet and exposes the
/// admin API until ctrl-c.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = Config::load(&path)?;
    info!("Batcher starting with config: {:?}", config);

    // Devnet chain seeded from the [chain] section.
    let worker = Address::new("f0101");
    let chain = MemoryChain::new(MinerInfo {
        owner: Address::new("f0100"),
        worker: worker.clone(),
        control_addresses: vec![],
    });
    chain.set_height(config.chain.start_height);
    chain.set_base_fee(config.chain.base_fee);
    chain.set_network_version(NetworkVersion(config.chain.network_version));
    chain.set_available_balance(config.chain.miner_available_balance);
    chain.set_wallet_balance(&worker, config.chain.wallet_balance);

    let engine = BatchEngine::new(
        config.miner.address.clone(),
        Arc::new(chain.clone()),
        Arc::new(chain),
        config.fees.clone(),
    )
    .with_selector(Arc::new(BalanceAddressSelector {
        disable_owner_fallback: config.miner.disable_owner_fallback,
    }));
    let sealing = SharedConfig::new(config.sealing.clone());
    let batcher = Arc::new(PreCommitBatcher::start(
        engine,
        Arc::new(sealing),
        Duration::from_secs(config.chain.block_delay_secs),
    )?);

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {:?}", e);
        }
        on_signal.cancel();
    });

    let server = Server::new(config.api.clone(), batcher.clone(), shutdown.clone());
    server.start().await?;

    // Bound the wait for the loop to finish its current step.
    let stop_ctx = CancellationToken::new();
    let deadline = stop_ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        deadline.cancel();
    });
    batcher.stop(&stop_ctx).await?;
    info!("Batcher shut down");

    Ok(())
}
