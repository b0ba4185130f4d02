//! # Deployment State
//!
//! Everything a `realty` data directory knows besides the keys: the network
//! label, the role → address book, and the escrow engine together with the
//! registry and ledger it owns. Persisted as pretty JSON in `state.json`.
//!
//! Each command loads the deployment, applies itself in memory, and saves
//! only on success. Saving writes a sibling temp file and renames it over
//! the old state, so a crash mid-write never leaves a torn file behind.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use realty_contracts::config::{DEVNET_AIRDROP, STATE_FILE_NAME, STATE_FORMAT_VERSION};
use realty_contracts::{Address, EscrowEngine, InMemoryLedger, Marketplace, RealEstate, Role};

/// Deployment nonce of the property registry.
const REGISTRY_NONCE: u64 = 0;
/// Deployment nonce of the escrow engine.
const ESCROW_NONCE: u64 = 1;

/// A deployed marketplace.
#[derive(Debug, Serialize, Deserialize)]
pub struct Deployment {
    /// On-disk format version.
    pub version: u32,
    pub network: String,
    pub created_at: DateTime<Utc>,
    /// Address of each role, as derived from its key at `init`.
    pub accounts: BTreeMap<Role, Address>,
    pub engine: Marketplace,
}

impl Deployment {
    /// Deploys a registry and an escrow engine for the given parties and
    /// airdrops every account its starting balance.
    ///
    /// Contract addresses derive from the seller, which plays the deployer.
    pub fn create(network: &str, accounts: BTreeMap<Role, Address>) -> Result<Self> {
        let party = |role: Role| -> Result<Address> {
            accounts
                .get(&role)
                .copied()
                .with_context(|| format!("no {} account", role))
        };
        let seller = party(Role::Seller)?;

        let mut ledger = InMemoryLedger::new();
        for address in accounts.values() {
            ledger.airdrop(address, DEVNET_AIRDROP)?;
        }

        let engine = EscrowEngine::new(
            Address::contract(&seller, ESCROW_NONCE),
            seller,
            party(Role::Inspector)?,
            party(Role::Lender)?,
            RealEstate::new(Address::contract(&seller, REGISTRY_NONCE)),
            ledger,
        );

        tracing::info!(
            network,
            escrow = %engine.address(),
            registry = %engine.nft_address(),
            "marketplace deployed"
        );

        Ok(Self {
            version: STATE_FORMAT_VERSION,
            network: network.to_string(),
            created_at: Utc::now(),
            accounts,
            engine,
        })
    }

    /// Location of the state file inside `data_dir`.
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(STATE_FILE_NAME)
    }

    pub fn exists(data_dir: &Path) -> bool {
        Self::path(data_dir).is_file()
    }

    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::path(data_dir);
        let text = fs::read_to_string(&path).with_context(|| {
            format!(
                "failed to read {} (run `realty init` first)",
                path.display()
            )
        })?;
        let deployment: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if deployment.version != STATE_FORMAT_VERSION {
            bail!(
                "{} has state format {}, this build reads {}",
                path.display(),
                deployment.version,
                STATE_FORMAT_VERSION
            );
        }
        tracing::debug!(path = %path.display(), "deployment loaded");
        Ok(deployment)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let path = Self::path(data_dir);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self).context("failed to serialize deployment")?;
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;

        tracing::debug!(path = %path.display(), "deployment saved");
        Ok(())
    }

    /// Address bound to `role`.
    pub fn address_of(&self, role: Role) -> Result<Address> {
        self.accounts
            .get(&role)
            .copied()
            .with_context(|| format!("deployment has no {} account", role))
    }

    /// Role name for a known address, for display.
    pub fn role_of(&self, address: &Address) -> Option<Role> {
        self.accounts
            .iter()
            .find(|(_, a)| *a == address)
            .map(|(role, _)| *role)
    }

    /// `seller 0x1a2b…9f0e`, or the bare short address for strangers.
    pub fn label(&self, address: &Address) -> String {
        match self.role_of(address) {
            Some(role) => format!("{} {}", role, address.short()),
            None if *address == self.engine.address() => format!("escrow {}", address.short()),
            None => address.short(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realty_contracts::{ether, AssetRegistry, FundsLedger};

    fn accounts() -> BTreeMap<Role, Address> {
        Role::ALL
            .into_iter()
            .enumerate()
            .map(|(i, role)| (role, Address::from_public_key(&[i as u8 + 1; 32])))
            .collect()
    }

    #[test]
    fn create_airdrops_every_account() {
        let deployment = Deployment::create("devnet", accounts()).unwrap();
        for address in deployment.accounts.values() {
            assert_eq!(
                deployment.engine.ledger().account_balance(address),
                DEVNET_AIRDROP
            );
        }
        assert_eq!(
            deployment.engine.seller(),
            deployment.address_of(Role::Seller).unwrap()
        );
        assert_ne!(deployment.engine.address(), deployment.engine.nft_address());
    }

    #[test]
    fn create_requires_every_role() {
        let mut partial = accounts();
        partial.remove(&Role::Lender);
        assert!(Deployment::create("devnet", partial).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut deployment = Deployment::create("devnet", accounts()).unwrap();
        let seller = deployment.address_of(Role::Seller).unwrap();
        let buyer = deployment.address_of(Role::Buyer).unwrap();
        let escrow = deployment.engine.address();
        let registry = deployment.engine.registry_mut();
        let id = registry.mint(&seller, "ipfs://1", None).unwrap();
        registry.approve(&seller, id, &escrow).unwrap();
        deployment
            .engine
            .list(&seller, id, &buyer, ether(20), ether(10))
            .unwrap();

        deployment.save(dir.path()).unwrap();
        assert!(Deployment::exists(dir.path()));
        assert!(!dir.path().join("state.json.tmp").exists());

        let loaded = Deployment::load(dir.path()).unwrap();
        assert_eq!(loaded.network, "devnet");
        assert_eq!(loaded.accounts, deployment.accounts);
        assert!(loaded.engine.is_listed(id));
        assert_eq!(loaded.engine.purchase_price(id), ether(20));
        assert_eq!(loaded.engine.registry().owner_of(id), Some(escrow));
    }

    #[test]
    fn load_without_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Deployment::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("realty init"));
    }

    #[test]
    fn load_rejects_other_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut deployment = Deployment::create("devnet", accounts()).unwrap();
        deployment.version = STATE_FORMAT_VERSION + 1;
        deployment.save(dir.path()).unwrap();
        assert!(Deployment::load(dir.path()).is_err());
    }

    #[test]
    fn labels_name_known_parties() {
        let deployment = Deployment::create("devnet", accounts()).unwrap();
        let lender = deployment.address_of(Role::Lender).unwrap();
        assert!(deployment.label(&lender).starts_with("lender 0x"));
        assert!(deployment
            .label(&deployment.engine.address())
            .starts_with("escrow 0x"));
        assert_eq!(deployment.role_of(&Address::ZERO), None);
    }
}
