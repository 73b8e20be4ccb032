#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use relaychat::Config;
use relaychat::cli::{Cli, handlers};
use relaychat::providers::http_client::install_crypto_provider;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Both ring and aws-lc-rs can end up linked; pick one before any TLS use.
    install_crypto_provider();

    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load_or_init()?;
    handlers::dispatch(cli, config).await
}
