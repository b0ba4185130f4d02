//! # Asset Registry Interface
//!
//! The escrow engine never owns property records itself. It talks to an
//! external system of record for unique-asset ownership through the
//! [`AssetRegistry`] trait: it pulls the asset into custody at listing and
//! pushes it out again at finalize or cancel.
//!
//! Transfer rules follow the usual NFT model: the operator moving an asset
//! must be its current owner or the single approved spender, and any
//! transfer clears the outstanding approval.

use thiserror::Error;

use crate::address::Address;

/// Identifier of a unique asset (a property token id).
pub type AssetId = u64;

/// Errors reported by an asset registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No token with this id has been minted.
    #[error("token not found: {0}")]
    TokenNotFound(AssetId),

    /// `from` is not the current owner of the token.
    #[error("{from} does not own token {asset_id} (owner is {owner})")]
    NotOwner {
        asset_id: AssetId,
        from: Address,
        owner: Address,
    },

    /// The operator is neither the owner nor the approved spender.
    #[error("{operator} is not authorized to move token {asset_id}")]
    NotAuthorized { asset_id: AssetId, operator: Address },

    /// Tokens cannot be minted or transferred to the zero address.
    #[error("zero address is not a valid recipient")]
    ZeroAddress,
}

/// Ownership authority for unique assets.
pub trait AssetRegistry {
    /// The registry's own contract address.
    fn address(&self) -> Address;

    /// Current owner of `asset_id`, or `None` if it was never minted.
    fn owner_of(&self, asset_id: AssetId) -> Option<Address>;

    /// Lets `spender` move `asset_id` once on the owner's behalf. Only the
    /// owner may approve.
    fn approve(
        &mut self,
        caller: &Address,
        asset_id: AssetId,
        spender: &Address,
    ) -> Result<(), RegistryError>;

    /// The currently approved spender for `asset_id`, if any.
    fn get_approved(&self, asset_id: AssetId) -> Option<Address>;

    /// Moves `asset_id` from `from` to `to`, acting as `operator`.
    fn transfer_ownership(
        &mut self,
        operator: &Address,
        asset_id: AssetId,
        from: &Address,
        to: &Address,
    ) -> Result<(), RegistryError>;
}
