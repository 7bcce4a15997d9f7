use crate::templates::DEFAULT_CONTRACTS;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flow_client::consts::{ACCESS_NODE_API, DEFAULT_COMPUTE_LIMIT, TX_SEAL_TIMEOUT_SECS};
use flow_client::{Address, ClientConfig, load_config_from_path};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// CLI arguments for artwalk
#[derive(Parser, Debug)]
#[command(name = "artwalk")]
#[command(
    about = "ArtWalk - Flow testnet profile and minting demo",
    long_about = None
)]
pub struct CliArgs {
    /// TOML file of configuration overrides (access node, contract aliases, ...)
    #[arg(long, env = "ARTWALK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Access node REST endpoint
    #[arg(long, env = "FLOW_ACCESS_NODE")]
    pub access_node: Option<String>,

    /// Account the wallet logs in as
    #[arg(long, env = "FLOW_ACCOUNT")]
    pub account: Option<Address>,

    /// Key index used for signing
    #[arg(long, env = "FLOW_KEY_ID", default_value_t = 0)]
    pub key_id: u32,

    /// Signing service receiving signables
    #[arg(long, env = "FLOW_SIGNER_URL")]
    pub signer_url: Option<String>,

    /// Computation limit for the mint transaction
    #[arg(long, default_value_t = DEFAULT_COMPUTE_LIMIT)]
    pub compute_limit: u64,

    /// How long to wait for a transaction to seal
    #[arg(long)]
    pub seal_timeout_secs: Option<u64>,

    /// Write logs here while the terminal UI is running
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive terminal UI (default)
    Ui,
    /// Print the latest block
    Block {
        /// Use the latest finalized block instead of the latest sealed one
        #[arg(long)]
        finalized: bool,
    },
    /// Print balance and keys of an account
    Account { address: Address },
}

/// Configuration with all values resolved
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub account: Option<Address>,
    pub key_id: u32,
    pub signer_url: Option<String>,
    pub compute_limit: u64,
    pub seal_timeout: Duration,
}

impl AppConfig {
    /// Load configuration with priority: CLI/env -> config file -> testnet defaults
    pub fn load(args: &CliArgs) -> Result<Self> {
        let mut client = ClientConfig::testnet();
        client.put_all(DEFAULT_CONTRACTS.iter().copied());

        if let Some(path) = &args.config {
            let file = load_config_from_path(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?;
            client.put_all(file.iter());
        }
        if let Some(url) = &args.access_node {
            client.put(ACCESS_NODE_API, url.as_str());
        }
        if let Some(secs) = args.seal_timeout_secs {
            client.put(TX_SEAL_TIMEOUT_SECS, secs.to_string());
        }

        let seal_timeout = client.seal_timeout()?;
        // Fail early on a malformed value rather than at the first transaction
        client.poll_interval()?;
        client.discovery_method()?;

        info!(
            access_node = client.access_node_api()?,
            account = ?args.account.map(|a| a.to_string()),
            key_id = args.key_id,
            signer = args.signer_url.is_some(),
            "Loaded configuration"
        );

        Ok(Self {
            client,
            account: args.account,
            key_id: args.key_id,
            signer_url: args.signer_url.clone(),
            compute_limit: args.compute_limit,
            seal_timeout,
        })
    }
}
