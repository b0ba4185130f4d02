//! # Party Keys
//!
//! One Ed25519 keypair per role, stored as `keys/<role>.key` inside the data
//! directory. The file holds the hex-encoded 32-byte secret key and is
//! readable by the owner only on Unix.
//!
//! A party's address is derived from its public key, so whoever can read a
//! key file can act as that party. Commands never accept an address in
//! place of a key.
//!
//! Key bytes are never logged.

use anyhow::{bail, Context, Result};
use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use realty_contracts::config::KEYS_DIR_NAME;
use realty_contracts::{Address, Role};

/// A role's signing key.
pub struct PartyKey {
    role: Role,
    signing_key: SigningKey,
}

impl PartyKey {
    /// Generates a fresh key for `role` from the OS RNG.
    pub fn generate(role: Role) -> Self {
        Self {
            role,
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reads the key for `role` from `data_dir`.
    pub fn load(data_dir: &Path, role: Role) -> Result<Self> {
        let path = key_path(data_dir, role);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {} key from {}", role, path.display()))?;
        let bytes = hex::decode(text.trim())
            .with_context(|| format!("{} is not valid hex", path.display()))?;
        let secret: [u8; SECRET_KEY_LENGTH] = match bytes.as_slice().try_into() {
            Ok(secret) => secret,
            Err(_) => bail!(
                "{} holds {} bytes, expected {}",
                path.display(),
                bytes.len(),
                SECRET_KEY_LENGTH
            ),
        };
        Ok(Self {
            role,
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    /// Writes the key to `data_dir`, creating the keys directory if needed.
    pub fn save(&self, data_dir: &Path) -> Result<PathBuf> {
        let dir = data_dir.join(KEYS_DIR_NAME);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create key directory {}", dir.display()))?;

        let path = key_path(data_dir, self.role);
        fs::write(&path, hex::encode(self.signing_key.to_bytes()))
            .with_context(|| format!("failed to write {} key to {}", self.role, path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(path)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The address this key controls.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.signing_key.verifying_key().to_bytes())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }
}

impl fmt::Debug for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartyKey")
            .field("role", &self.role)
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Location of the key file for `role`.
pub fn key_path(data_dir: &Path, role: Role) -> PathBuf {
    data_dir
        .join(KEYS_DIR_NAME)
        .join(format!("{}.key", role.as_str()))
}
