//! # Marketplace Constants & Units
//!
//! Every constant the contracts and the CLI agree on lives here, together with
//! the conversion between human-readable ether strings and base units.
//!
//! Amounts are `u128` base units with 18 decimals, the usual ether scale.
//! `u64` would top out at roughly 18 ether, which is not much of a house.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// An amount of native currency in base units.
pub type Amount = u128;

/// Number of decimal places in one ether.
pub const ETHER_DECIMALS: u32 = 18;

/// Base units per ether.
pub const WEI_PER_ETHER: Amount = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Collection name reported by the property registry.
pub const REGISTRY_NAME: &str = "Real Estate";

/// Collection symbol reported by the property registry.
pub const REGISTRY_SYMBOL: &str = "REAL";

/// The first token id handed out by the registry. Ids are sequential and
/// never reused.
pub const FIRST_TOKEN_ID: u64 = 1;

// ---------------------------------------------------------------------------
// Devnet
// ---------------------------------------------------------------------------

/// Network name written into fresh deployments unless overridden.
pub const DEFAULT_NETWORK: &str = "devnet";

/// Balance airdropped to every devnet account at `init`.
pub const DEVNET_AIRDROP: Amount = 10_000 * WEI_PER_ETHER;

/// File name of the persisted deployment inside the data directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Directory (inside the data directory) holding one key file per role.
pub const KEYS_DIR_NAME: &str = "keys";

/// Version of the on-disk state format. Bump when the layout of the
/// persisted deployment changes incompatibly.
pub const STATE_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Errors produced when parsing ether strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    /// The input was empty or contained something other than digits and a
    /// single decimal point.
    #[error("invalid ether amount: '{0}'")]
    Malformed(String),

    /// More fractional digits than the currency supports.
    #[error("too many decimal places in '{0}' (max {max})", max = ETHER_DECIMALS)]
    TooPrecise(String),

    /// The amount does not fit in a `u128`.
    #[error("ether amount out of range: '{0}'")]
    Overflow(String),
}

/// Parses a decimal ether string (`"5"`, `"0.25"`, `"1_000"`) into base units.
pub fn parse_ether(input: &str) -> Result<Amount, UnitsError> {
    let cleaned: String = input.trim().chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() {
        return Err(UnitsError::Malformed(input.to_string()));
    }

    let (whole, fraction) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(UnitsError::Malformed(input.to_string()));
    }
    if fraction.len() > ETHER_DECIMALS as usize {
        return Err(UnitsError::TooPrecise(input.to_string()));
    }

    let overflow = || UnitsError::Overflow(input.to_string());

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<Amount>().map_err(|_| overflow())?
    };

    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let scale = 10u128.pow(ETHER_DECIMALS - fraction.len() as u32);
        fraction.parse::<Amount>().map_err(|_| overflow())? * scale
    };

    whole_units
        .checked_mul(WEI_PER_ETHER)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or_else(overflow)
}

/// Formats base units as a decimal ether string without trailing zeros.
pub fn format_ether(amount: Amount) -> String {
    let whole = amount / WEI_PER_ETHER;
    let fraction = amount % WEI_PER_ETHER;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", fraction, width = ETHER_DECIMALS as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Shorthand for whole-ether amounts, mostly for tests and devnet setup.
pub const fn ether(n: u64) -> Amount {
    n as Amount * WEI_PER_ETHER
}
