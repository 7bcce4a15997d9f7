//! Client configuration.
//!
//! A [`ClientConfig`] is a plain key/value object built once at startup and shared by
//! reference (`Arc<ClientConfig>`) with every component that talks to the network. Values are
//! not validated when they are set; typed accessors report a [`ClientError::Config`] only when
//! a value is actually used.

use crate::consts::{
    ACCESS_NODE_API, ALIAS_PREFIX, APP_TITLE, DEFAULT_APP_TITLE, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SEAL_TIMEOUT_SECS, DISCOVERY_AUTHN_ENDPOINT, DISCOVERY_WALLET,
    DISCOVERY_WALLET_METHOD, FLOW_NETWORK, TESTNET_ACCESS_NODE, TESTNET_DISCOVERY_AUTHN,
    TESTNET_DISCOVERY_WALLET, TX_POLL_INTERVAL_MS, TX_SEAL_TIMEOUT_SECS,
};
use crate::error::{ClientError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// How the wallet handshake is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryMethod {
    #[default]
    IframeRpc,
    PopRpc,
    TabRpc,
    HttpPost,
}

impl DiscoveryMethod {
    pub fn all() -> &'static [DiscoveryMethod] {
        &[
            DiscoveryMethod::IframeRpc,
            DiscoveryMethod::PopRpc,
            DiscoveryMethod::TabRpc,
            DiscoveryMethod::HttpPost,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::IframeRpc => "IFRAME/RPC",
            DiscoveryMethod::PopRpc => "POP/RPC",
            DiscoveryMethod::TabRpc => "TAB/RPC",
            DiscoveryMethod::HttpPost => "HTTP/POST",
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                ClientError::config(
                    DISCOVERY_WALLET_METHOD,
                    format!("unknown method `{s}`, expected one of IFRAME/RPC, POP/RPC, TAB/RPC, HTTP/POST"),
                )
            })
    }
}

/// Key/value configuration shared by the client components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    values: BTreeMap<String, String>,
}

impl ClientConfig {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Public testnet settings used by the ArtWalk demo.
    pub fn testnet() -> Self {
        Self::new()
            .with(ACCESS_NODE_API, TESTNET_ACCESS_NODE)
            .with(DISCOVERY_WALLET, TESTNET_DISCOVERY_WALLET)
            .with(DISCOVERY_WALLET_METHOD, DiscoveryMethod::PopRpc.as_str())
            .with(DISCOVERY_AUTHN_ENDPOINT, TESTNET_DISCOVERY_AUTHN)
            .with(APP_TITLE, DEFAULT_APP_TITLE)
            .with(FLOW_NETWORK, "testnet")
    }

    /// Set `key` to `value`, replacing any earlier value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`ClientConfig::put`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put(key, value);
        self
    }

    /// Apply every pair in order; later pairs win over earlier ones and over existing values.
    pub fn put_all<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in pairs {
            self.put(k, v);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Access node base URL, unchecked.
    pub fn access_node_api(&self) -> Result<&str> {
        self.get(ACCESS_NODE_API)
            .ok_or_else(|| ClientError::config(ACCESS_NODE_API, "not set"))
    }

    pub fn app_title(&self) -> &str {
        self.get(APP_TITLE).unwrap_or(DEFAULT_APP_TITLE)
    }

    pub fn discovery_method(&self) -> Result<DiscoveryMethod> {
        match self.get(DISCOVERY_WALLET_METHOD) {
            Some(raw) => raw.parse(),
            None => Ok(DiscoveryMethod::default()),
        }
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        self.duration(TX_POLL_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS, Duration::from_millis)
    }

    pub fn seal_timeout(&self) -> Result<Duration> {
        self.duration(TX_SEAL_TIMEOUT_SECS, DEFAULT_SEAL_TIMEOUT_SECS, Duration::from_secs)
    }

    fn duration(&self, key: &str, default: u64, unit: fn(u64) -> Duration) -> Result<Duration> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(unit)
                .map_err(|e| ClientError::config(key, format!("`{raw}`: {e}"))),
            None => Ok(unit(default)),
        }
    }

    /// Contract aliases (`0xName` keys) and the addresses they stand for.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| is_alias_key(k))
    }

    /// Replace every `0xName` placeholder in `cadence` that has an alias.
    ///
    /// Only whole tokens are replaced, so `0xFUSD` never rewrites part of `0xFUSDToken`.
    /// Hex literals and unknown placeholders are left as they are.
    pub fn resolve_imports(&self, cadence: &str) -> String {
        let mut out = String::with_capacity(cadence.len());
        let mut rest = cadence;
        while let Some(start) = rest.find(ALIAS_PREFIX) {
            let preceded_by_ident = rest[..start]
                .chars()
                .next_back()
                .is_some_and(is_ident_char);
            out.push_str(&rest[..start]);
            let token_len = ALIAS_PREFIX.len()
                + rest[start + ALIAS_PREFIX.len()..]
                    .find(|c: char| !is_ident_char(c))
                    .unwrap_or(rest.len() - start - ALIAS_PREFIX.len());
            let token = &rest[start..start + token_len];
            match self.get(token) {
                Some(address) if !preceded_by_ident && is_alias_key(token) => out.push_str(address),
                _ => {
                    if !preceded_by_ident && is_alias_key(token) {
                        warn!(placeholder = token, "No address configured for contract alias");
                    }
                    out.push_str(token);
                }
            }
            rest = &rest[start + token_len..];
        }
        out.push_str(rest);
        out
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `0x` followed by an identifier that is not a plain hex literal.
fn is_alias_key(key: &str) -> bool {
    key.strip_prefix(ALIAS_PREFIX).is_some_and(|name| {
        !name.is_empty()
            && name.chars().all(is_ident_char)
            && !name.chars().all(|c| c.is_ascii_hexdigit())
    })
}

/// Load configuration overrides from a TOML file of string keys and values.
///
/// ```toml
/// "accessNode.api" = "https://rest-testnet.onflow.org"
/// "0xProfile" = "0xba1132bc08f82fe2"
/// ```
pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
        .map_err(|e| ClientError::config(&path.display().to_string(), e.to_string()))?;
    parse_config(&s).map_err(|reason| ClientError::config(&path.display().to_string(), reason))
}

fn parse_config(s: &str) -> std::result::Result<ClientConfig, String> {
    let table: toml::Table = toml::from_str(s).map_err(|e| e.to_string())?;
    let mut config = ClientConfig::new();
    for (key, value) in table {
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => return Err(format!("`{key}` must be a string, got {}", other.type_str())),
        };
        config.put(key, value);
    }
    Ok(config)
}
