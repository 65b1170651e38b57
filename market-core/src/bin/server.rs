//! Market server binary

use market_core::{Config, Market};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting PrizeMarket server");

    // Load configuration (file path via argv, env overrides otherwise)
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Open market (replays the event log)
    let market = Market::open(config).await?;
    let records = market.verify_event_log()?;
    tracing::info!(records, "market opened, event log verified");

    // TODO: attach the host transport adapter here
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down market server");
    market.shutdown().await?;
    Ok(())
}
