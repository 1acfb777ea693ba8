use clap::Parser;
use std::process::ExitCode;
use tracing::info;

mod cli;
mod config;
mod diagnostics;
mod error;
mod network;
mod probe;
mod security;
mod utils;

use cli::Cli;
use config::AppConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // .env has to be in the environment before clap reads SUPABASE_* vars
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load_default(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            let report = probe::report_load_failure(&e, cli.format(), &mut std::io::stdout());
            return ExitCode::from(report.exit_code() as u8);
        }
    };
    config.apply(cli.overrides());

    utils::init_tracing(&config.logging.level);
    info!("Starting supabase_handshake");
    match dotenv {
        Ok(path) => info!("loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("ignoring unreadable .env: {}", e),
    }

    let report = probe::test_connection(config, cli.format(), &mut std::io::stdout()).await;
    ExitCode::from(report.exit_code() as u8)
}
