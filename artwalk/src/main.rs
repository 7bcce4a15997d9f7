use anyhow::{Context, Result};
use app::{App, AppOptions, MintParams};
use args::{AppConfig, CliArgs, Command};
use clap::Parser;
use flow_client::FlowClient;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wallet::ConfiguredWallet;

mod app;
mod args;
mod templates;
mod tui;
mod wallet;

/// The terminal UI owns stdout, so its logs go to a file or nowhere.
fn init_tracing(interactive: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy()
        .add_directive("artwalk=info".parse()?)
        .add_directive("flow_client=info".parse()?);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    let stdout_layer = (!interactive).then(|| fmt::layer().with_ansi(true));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let command = cli_args.command.clone().unwrap_or(Command::Ui);
    init_tracing(command == Command::Ui, cli_args.log_file.as_deref())?;

    let config = AppConfig::load(&cli_args)?;
    let wallet = Arc::new(ConfiguredWallet::new(&config)?);
    let client: FlowClient = FlowClient::connect(config.client.clone(), wallet)
        .context("Failed to create Flow client")?;

    match command {
        Command::Ui => {
            let options = AppOptions {
                mint: MintParams {
                    compute_limit: config.compute_limit,
                    ..MintParams::default()
                },
                seal_timeout: config.seal_timeout,
            };
            tui::run(App::new(client, options))?;
        }
        Command::Block { finalized } => {
            let block = client
                .latest_block(!finalized)
                .await
                .context("Failed to fetch latest block")?;
            info!(height = block.height, id = %block.id, "Fetched latest block");
            println!("{}", serde_json::to_string_pretty(&block)?);
        }
        Command::Account { address } => {
            let account = client
                .account(address)
                .await
                .with_context(|| format!("Failed to fetch account {address}"))?;
            let access_node = client.config().access_node_api()?;
            println!("{}", wallet::render_account_summary(&account, access_node));
        }
    }

    info!("Shutdown complete");
    Ok(())
}
