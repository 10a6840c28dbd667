//! Primitive identifier types
//!
//! Naming conventions:
//! - `Address`: 20-byte account identifier (wallets, session keys, tokens)
//! - `H256`: 32-byte Keccak digest (channel, state, session, tx and batch IDs)

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

// ============================================================
// Address
// ============================================================

/// 20-byte account address.
///
/// Parsing accepts any letter case, so two spellings of the same wallet compare
/// equal. Display is always lowercase with a `0x` prefix.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Parse from a hex string with optional `0x` prefix
    pub fn from_hex(s: &str) -> CoreResult<Self> {
        let bytes = hex::decode(strip_hex_prefix(s.trim()))
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        Self::from_slice(&bytes).ok_or_else(|| CoreError::InvalidAddress(s.to_string()))
    }

    /// Build from a byte slice of exactly 20 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 20 {
            return None;
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(bytes);
        Some(Self(arr))
    }

    /// Lowercase `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// H256
// ============================================================

/// 32-byte digest
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct H256(pub [u8; 32]);

impl H256 {
    /// The zero digest
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Parse from a hex string with optional `0x` prefix
    pub fn from_hex(s: &str) -> CoreResult<Self> {
        let bytes = hex::decode(strip_hex_prefix(s.trim()))
            .map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(CoreError::InvalidHash(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Lowercase `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl FromStr for H256 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl std::fmt::Debug for H256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "H256({}...)", &self.to_hex()[..18])
    }
}

impl std::fmt::Display for H256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        H256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Home or escrow channel identifier
pub type ChannelId = H256;
/// Channel state identifier, derived from (wallet, asset, epoch, version)
pub type StateId = H256;
/// App session identifier, derived from the app definition
pub type AppSessionId = H256;
/// Transaction / transition identifier
pub type TxId = H256;
/// Rebalance batch identifier
pub type BatchId = H256;
