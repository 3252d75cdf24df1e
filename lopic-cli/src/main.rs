mod cli;
mod commands;
mod config;
mod error;
mod logging;

use std::{process, sync::Arc};

use clap::Parser;
use lopic_client::{ApiRequest, FileCredentialStore, LopicClient};
use tracing::{debug, error};

use crate::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
    error::Result,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        if e.requires_login() {
            eprintln!("Run `lopic login <username>` to start a new session.");
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    // Load configuration
    let config = AppConfig::load(args.config.as_deref())?;

    let log_dir = args.log_dir.clone().or_else(|| config.log_dir.clone());
    let _log_guard = logging::init_logging(args.verbose, args.quiet, log_dir.as_deref())?;
    debug!(server = %config.server_url, "Loaded configuration");

    if let Commands::Config { show, reset } = args.command {
        if reset {
            AppConfig::reset(args.config.as_deref())?;
            println!("✓ Configuration reset to defaults");
        } else if show {
            println!("{}", config.show()?);
        } else {
            println!("Use --show to display current configuration or --reset to reset to defaults");
        }
        return Ok(());
    }

    let store = FileCredentialStore::open(config.credentials_path());
    let client = LopicClient::new(
        config.client_config(args.server.as_deref())?,
        Arc::new(store),
    )?;
    let executor = CommandExecutor::new(client, config);

    match args.command {
        Commands::Login { username, password } => executor.login(&username, password).await?,
        Commands::Logout => executor.logout().await?,
        Commands::Status => executor.status()?,
        Commands::Get { path, query } => {
            let request = query
                .into_iter()
                .fold(ApiRequest::get(path), |request, (key, value)| {
                    request.query(key, value)
                });
            executor.call(request, None).await?
        }
        Commands::Post { path, data } => {
            executor.call(ApiRequest::post(path), data.as_deref()).await?
        }
        Commands::Put { path, data } => {
            executor.call(ApiRequest::put(path), data.as_deref()).await?
        }
        Commands::Delete { path } => executor.call(ApiRequest::delete(path), None).await?,
        Commands::Watch { tags } => executor.watch(&tags).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
