//! # Party & Contract Addresses
//!
//! Every participant in a sale (seller, buyer, inspector, lender) and every
//! deployed contract (the property registry, the escrow engine) is identified
//! by a 20-byte [`Address`].
//!
//! Party addresses are derived from an Ed25519 public key; contract addresses
//! are derived from the deployer's address and a deployment nonce. Both use
//! BLAKE3 in `derive_key` mode with distinct context strings, so a party
//! address can never collide with a contract address by construction.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

const PARTY_CONTEXT: &str = "realty 2026 party address";
const CONTRACT_CONTEXT: &str = "realty 2026 contract address";

/// Errors produced when parsing an address from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address hex: {0}")]
    InvalidHex(String),

    #[error("invalid address length: expected {expected} bytes, got {0}", expected = ADDRESS_LENGTH)]
    InvalidLength(usize),
}

/// A 20-byte account or contract address.
///
/// Displayed and serialized as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never a valid owner or recipient.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Wraps raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derives the address controlled by an Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self::truncate(blake3::derive_key(PARTY_CONTEXT, public_key))
    }

    /// Derives the address of the `nonce`-th contract deployed by `deployer`.
    pub fn contract(deployer: &Address, nonce: u64) -> Self {
        let mut material = [0u8; ADDRESS_LENGTH + 8];
        material[..ADDRESS_LENGTH].copy_from_slice(&deployer.0);
        material[ADDRESS_LENGTH..].copy_from_slice(&nonce.to_be_bytes());
        Self::truncate(blake3::derive_key(CONTRACT_CONTEXT, &material))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns `true` for [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Returns `0x…` hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Abbreviated form for display, e.g. `0x1a2b…9f0e`.
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}…{}", &full[..4], &full[full.len() - 4..])
    }

    fn truncate(digest: [u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(body).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let array: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
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
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let pk = [7u8; 32];
        assert_eq!(Address::from_public_key(&pk), Address::from_public_key(&pk));
        assert_ne!(Address::from_public_key(&pk), Address::from_public_key(&[8u8; 32]));
    }

    #[test]
    fn contract_addresses_depend_on_nonce() {
        let deployer = Address::from_public_key(&[1u8; 32]);
        let first = Address::contract(&deployer, 0);
        let second = Address::contract(&deployer, 1);
        assert_ne!(first, second);
        assert_ne!(first, deployer);
        assert!(!first.is_zero());
    }

    #[test]
    fn hex_parse_accepts_prefix_and_rejects_bad_length() {
        let addr = Address::from_public_key(&[3u8; 32]);
        let text = addr.to_hex();
        assert!(text.starts_with("0x"));
        assert_eq!(text.parse::<Address>().unwrap(), addr);
        assert_eq!(text.trim_start_matches("0x").parse::<Address>().unwrap(), addr);
        assert_eq!("0xabcd".parse::<Address>(), Err(AddressError::InvalidLength(2)));
        assert!(matches!("0xzz".parse::<Address>(), Err(AddressError::InvalidHex(_))));
    }

    #[test]
    fn serializes_as_hex_string() {
        let addr = Address::from_bytes([0xab; ADDRESS_LENGTH]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(ADDRESS_LENGTH)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn short_form_keeps_both_ends() {
        let addr = Address::from_bytes([0x12; ADDRESS_LENGTH]);
        assert_eq!(addr.short(), "0x1212…1212");
    }
}
