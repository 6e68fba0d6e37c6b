use std::path::PathBuf;

use clap::Parser;
use sentinel::{Config, SentinelBuilder};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "sentinel",
    about = "A blockchain observability pipeline for EVM networks",
    version
)]
struct Cli {
    /// Path to the configuration file
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    sentinel::setup_info_logger();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("sentinel.yaml"));
    let config = Config::load(&config_path)?;

    let mut pipeline = SentinelBuilder::new(config).build()?;

    info!("Starting Sentinel...");
    pipeline.start().await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down Sentinel...");
            sentinel::mark_shutdown_started();
        }
        _ = pipeline.join() => {}
    }

    pipeline.stop().await;
    Ok(())
}
