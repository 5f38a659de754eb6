//! Entrypoint.

use driver::Driver;

use clap::Parser;
use config::Opts;
use dotenvy::dotenv;
use runtime::shutdown::{ShutdownSignal, stop_channel, stop_on_signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        // Try the default .env file, and ignore if it doesn't exist.
        dotenv().ok();
    }

    let opts = Opts::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("Fundscope indexer starting...");

    let (stop_tx, stop_rx) = stop_channel();
    tokio::spawn(stop_on_signal(ShutdownSignal::new()?, stop_tx));

    Driver::new(opts).await?.start(stop_rx).await
}
