use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;

/// Length of a Flow account address in bytes
pub const ADDRESS_LENGTH: usize = 8;

/// Length of a block or transaction identifier in bytes
pub const IDENTIFIER_LENGTH: usize = 32;

/// Flow account address.
///
/// Parses with or without the `0x` prefix and left-pads short forms, so `"0x01"` is the same
/// account as `"0x0000000000000001"`. Always displayed in the padded, prefixed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Hex without prefix, the form the access API expects in request bodies and paths.
    pub fn sans_prefix(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = parse_padded_hex::<ADDRESS_LENGTH>(s)?;
        Ok(Self(bytes))
    }
}

/// Block or transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct Identifier([u8; IDENTIFIER_LENGTH]);

/// Identifier returned when a transaction is submitted
pub type TxId = Identifier;

impl Identifier {
    pub const fn new(bytes: [u8; IDENTIFIER_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_LENGTH] {
        &self.0
    }

    /// Shortened form (`1234abcd…5678`) for status lines.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}…{}", &full[..8], &full[full.len() - 4..])
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Identifier {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        if stripped.len() != IDENTIFIER_LENGTH * 2 {
            return Err(ParseIdError(format!(
                "expected {} hex characters, got {}",
                IDENTIFIER_LENGTH * 2,
                stripped.len()
            )));
        }
        let bytes = parse_padded_hex::<IDENTIFIER_LENGTH>(stripped)?;
        Ok(Self(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex identifier: {0}")]
pub struct ParseIdError(String);

fn parse_padded_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    if stripped.is_empty() || stripped.len() > N * 2 {
        return Err(ParseIdError(format!("`{s}` does not fit in {N} bytes")));
    }
    let padded = format!("{stripped:0>width$}", width = N * 2);
    let mut out = [0u8; N];
    hex::decode_to_slice(&padded, &mut out).map_err(|e| ParseIdError(format!("`{s}`: {e}")))?;
    Ok(out)
}
