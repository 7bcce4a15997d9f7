//! Centralized defaults for the client.
//!
//! Network defaults point at the public Flow testnet. Polling values are shorter in debug
//! builds so local runs and tests observe status transitions quickly.

// =============================================================================
// Configuration Keys
// =============================================================================

/// REST endpoint of the access node all reads and writes go through
pub const ACCESS_NODE_API: &str = "accessNode.api";
/// Wallet discovery endpoint
pub const DISCOVERY_WALLET: &str = "discovery.wallet";
/// Transport used for the wallet handshake
pub const DISCOVERY_WALLET_METHOD: &str = "discovery.wallet.method";
/// Authentication endpoint of the discovery service
pub const DISCOVERY_AUTHN_ENDPOINT: &str = "discovery.authn.endpoint";
/// Application display name shown by wallets
pub const APP_TITLE: &str = "app.detail.title";
/// Application icon shown by wallets
pub const APP_ICON: &str = "app.detail.icon";
/// Network name (`testnet`, `mainnet`, `emulator`)
pub const FLOW_NETWORK: &str = "flow.network";
/// Interval between transaction status polls, in milliseconds
pub const TX_POLL_INTERVAL_MS: &str = "tx.pollIntervalMs";
/// Upper bound on how long a status stream may run, in seconds
pub const TX_SEAL_TIMEOUT_SECS: &str = "tx.sealTimeoutSecs";

/// Prefix marking a contract address alias key such as `0xProfile`
pub const ALIAS_PREFIX: &str = "0x";

// =============================================================================
// Testnet Defaults
// =============================================================================

pub const TESTNET_ACCESS_NODE: &str = "https://rest-testnet.onflow.org";
pub const TESTNET_DISCOVERY_WALLET: &str = "https://fcl-discovery.onflow.org/testnet/authn";
pub const TESTNET_DISCOVERY_AUTHN: &str = "https://fcl-discovery.onflow.org/api/testnet/authn";
pub const DEFAULT_APP_TITLE: &str = "ArtWalk";

// =============================================================================
// Transaction Status Polling
// =============================================================================

/// Default interval between status polls in milliseconds
#[cfg(debug_assertions)]
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

#[cfg(not(debug_assertions))]
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default deadline for a status stream in seconds
pub const DEFAULT_SEAL_TIMEOUT_SECS: u64 = 300;

/// Timeout applied to every HTTP request made to the access node
pub const HTTP_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Transaction Defaults
// =============================================================================

/// Computation limit used when a request does not set one
pub const DEFAULT_COMPUTE_LIMIT: u64 = 100;
