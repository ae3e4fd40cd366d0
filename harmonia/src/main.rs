use std::path::PathBuf;

use clap::Parser;

use harmonia_core::logging::init_logging;
use harmonia_core::Config;

mod http;
mod server;

/// Personal music aggregation server.
#[derive(Parser, Debug)]
#[command(name = "harmonia", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, env = "HARMONIA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config.logging)?;

    let server = server::Server::bootstrap(config).await?;
    server.run().await
}
