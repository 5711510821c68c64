mod cli;
mod config;
mod gemini;
mod http;
mod serve;
mod sweeper;

use clap::Parser;
use cli::{Cli, Commands};
use config::TutorlineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = TutorlineConfig::load_or_default(&cli.config);
            serve::run(config).await
        }
        Commands::Config(cmd) => cli::config_cmd::run(cmd, &cli.config).await,
        Commands::Stats => cli::stats::run(&cli.server).await,
        Commands::Ask(args) => cli::ask::run(args, &cli.server).await,
    }
}
