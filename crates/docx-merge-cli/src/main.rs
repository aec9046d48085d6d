mod commands;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let succeeded = commands::run(&config)?;
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
