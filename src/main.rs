use clap::Parser;
use hoopline::cli::Cli;
use tracing::error;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    if cli.wants_full_logging() {
        init_logging(&config.logging);
    } else {
        init_logging_simple();
    }

    if let Err(e) = cli.run(config).await {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}
