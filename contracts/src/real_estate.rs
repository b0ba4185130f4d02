//! # Real Estate Registry Contract
//!
//! A non-fungible token collection where every token is one property. Any
//! account can mint a token to itself by publishing a metadata URI; the
//! minter becomes the owner and may later approve a single spender (usually
//! the escrow engine) to move the token.
//!
//! ## Ownership Model
//!
//! - **Sequential ids**: tokens are numbered from [`FIRST_TOKEN_ID`] upwards
//!   and ids are never reused.
//! - **Single approval**: each token carries at most one approved spender.
//!   Approving again overwrites it; any transfer clears it.
//! - **Owner index**: the registry keeps a reverse index so wallets can list
//!   their properties without scanning every token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::address::Address;
use crate::config::{FIRST_TOKEN_ID, REGISTRY_NAME, REGISTRY_SYMBOL};
use crate::metadata::PropertyMetadata;
use crate::registry::{AssetId, AssetRegistry, RegistryError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One minted property token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyToken {
    /// Token id.
    pub token_id: AssetId,
    /// Current owner.
    pub owner: Address,
    /// Account allowed to move the token once, if any.
    pub approved: Option<Address>,
    /// Location of the token's metadata document.
    pub token_uri: String,
    /// Locally known copy of the metadata document, when the minter
    /// supplied one.
    pub metadata: Option<PropertyMetadata>,
    /// Timestamp when the token was minted.
    pub minted_at: DateTime<Utc>,
}

/// The property registry. Implements [`AssetRegistry`] for the escrow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealEstate {
    /// The registry's contract address.
    address: Address,
    /// Minted tokens keyed by id.
    tokens: BTreeMap<AssetId, PropertyToken>,
    /// Reverse index `owner -> token ids`.
    owned: BTreeMap<Address, BTreeSet<AssetId>>,
    /// Id the next mint will receive.
    next_token_id: AssetId,
}

impl RealEstate {
    /// Creates an empty registry deployed at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            tokens: BTreeMap::new(),
            owned: BTreeMap::new(),
            next_token_id: FIRST_TOKEN_ID,
        }
    }

    /// Mints a new property token to `owner` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ZeroAddress`] if `owner` is the zero address.
    pub fn mint(
        &mut self,
        owner: &Address,
        token_uri: impl Into<String>,
        metadata: Option<PropertyMetadata>,
    ) -> Result<AssetId, RegistryError> {
        if owner.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }

        let token_id = self.next_token_id;
        self.next_token_id += 1;

        let token = PropertyToken {
            token_id,
            owner: *owner,
            approved: None,
            token_uri: token_uri.into(),
            metadata,
            minted_at: Utc::now(),
        };
        self.tokens.insert(token_id, token);
        self.owned.entry(*owner).or_default().insert(token_id);

        tracing::info!(token_id, owner = %owner, "property minted");
        Ok(token_id)
    }

    /// Collection name.
    pub fn name(&self) -> &'static str {
        REGISTRY_NAME
    }

    /// Collection symbol.
    pub fn symbol(&self) -> &'static str {
        REGISTRY_SYMBOL
    }

    /// Number of tokens minted so far.
    pub fn total_supply(&self) -> u64 {
        self.tokens.len() as u64
    }

    /// Returns the token record, or `None` if it was never minted.
    pub fn token(&self, token_id: AssetId) -> Option<&PropertyToken> {
        self.tokens.get(&token_id)
    }

    /// Metadata URI of a token.
    pub fn token_uri(&self, token_id: AssetId) -> Option<&str> {
        self.tokens.get(&token_id).map(|t| t.token_uri.as_str())
    }

    /// Locally stored metadata of a token.
    pub fn metadata(&self, token_id: AssetId) -> Option<&PropertyMetadata> {
        self.tokens.get(&token_id).and_then(|t| t.metadata.as_ref())
    }

    /// Token ids currently owned by `owner`, in ascending order.
    pub fn tokens_of(&self, owner: &Address) -> Vec<AssetId> {
        self.owned
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn token_mut(&mut self, token_id: AssetId) -> Result<&mut PropertyToken, RegistryError> {
        self.tokens
            .get_mut(&token_id)
            .ok_or(RegistryError::TokenNotFound(token_id))
    }
}

impl AssetRegistry for RealEstate {
    fn address(&self) -> Address {
        self.address
    }

    fn owner_of(&self, asset_id: AssetId) -> Option<Address> {
        self.tokens.get(&asset_id).map(|t| t.owner)
    }

    fn approve(
        &mut self,
        caller: &Address,
        asset_id: AssetId,
        spender: &Address,
    ) -> Result<(), RegistryError> {
        let token = self.token_mut(asset_id)?;
        if token.owner != *caller {
            return Err(RegistryError::NotOwner {
                asset_id,
                from: *caller,
                owner: token.owner,
            });
        }

        token.approved = if spender.is_zero() { None } else { Some(*spender) };
        tracing::debug!(token_id = asset_id, spender = %spender, "transfer approved");
        Ok(())
    }

    fn get_approved(&self, asset_id: AssetId) -> Option<Address> {
        self.tokens.get(&asset_id).and_then(|t| t.approved)
    }

    fn transfer_ownership(
        &mut self,
        operator: &Address,
        asset_id: AssetId,
        from: &Address,
        to: &Address,
    ) -> Result<(), RegistryError> {
        if to.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }

        let token = self.token_mut(asset_id)?;
        if token.owner != *from {
            return Err(RegistryError::NotOwner {
                asset_id,
                from: *from,
                owner: token.owner,
            });
        }
        if *operator != token.owner && token.approved != Some(*operator) {
            return Err(RegistryError::NotAuthorized {
                asset_id,
                operator: *operator,
            });
        }

        token.owner = *to;
        token.approved = None;

        if let Some(ids) = self.owned.get_mut(from) {
            ids.remove(&asset_id);
            if ids.is_empty() {
                self.owned.remove(from);
            }
        }
        self.owned.entry(*to).or_default().insert(asset_id);

        tracing::debug!(token_id = asset_id, from = %from, to = %to, "property transferred");
        Ok(())
    }
}
