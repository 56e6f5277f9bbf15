use anyhow::Context;
use tokio::signal;
use tracing::info;

use tradecast::app::runtime::Runtime;
use tradecast::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::load("config.toml").context("failed to load config.toml")?;
    config.init_logging();
    info!("tradecast starting");

    let runtime = Runtime::build(config).context("failed to build runtime")?;
    let handles = runtime.start();

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => info!(error = %e, "Signal handler failed, shutting down"),
    }

    runtime.shutdown();
    for handle in handles {
        let _ = handle.await;
    }

    info!("tradecast stopped");
    Ok(())
}
