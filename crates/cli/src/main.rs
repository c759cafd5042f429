mod cli;
mod filter;
mod report;

use anyhow::Result;
use clap::Parser;

use taskscope_core::config::{self, Config};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = Config::from_env();
    if let Some(url) = args.api_url {
        config.api.base_url = url;
    }

    match args.command {
        Command::Filter(filter) => {
            if let Some(size) = filter.page_size {
                config.scan.page_size = size.max(1);
            }
            config.log_summary();
            filter::run(filter, config).await
        }
    }
}
