use std::fmt::{Debug, Formatter};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::Config;

/// Length in bytes of every symmetric key (AES-256).
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash an arbitrary-length secret down to a key.
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(secret.as_ref()).into())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Debug for SymmetricKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Source of the process-wide master key material.
///
/// Implementations are read-only once constructed; the cryptography engine
/// takes one at construction and never looks anywhere else for keys.
pub trait KeyProvider: Send + Sync {
    /// Master secret that seeds every seal-derived ballot key.
    fn vote_master_key(&self) -> &SymmetricKey;

    /// Key for the ballot signature MAC. Distinct from the master key.
    fn signing_key(&self) -> &SymmetricKey;

    /// Fixed key for voter justifications, independent of any seal.
    fn justification_key(&self) -> &SymmetricKey;
}

/// Key material fixed at startup, single key epoch.
pub struct StaticKeys {
    vote_master: SymmetricKey,
    signing: SymmetricKey,
    justification: SymmetricKey,
}

impl StaticKeys {
    /// Build the key set from three configured secrets.
    /// Each secret is hashed so any length is accepted.
    pub fn from_secrets(
        vote_master: impl AsRef<[u8]>,
        signing: impl AsRef<[u8]>,
        justification: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            vote_master: SymmetricKey::from_secret(vote_master),
            signing: SymmetricKey::from_secret(signing),
            justification: SymmetricKey::from_secret(justification),
        }
    }
}

impl From<&Config> for StaticKeys {
    fn from(config: &Config) -> Self {
        Self::from_secrets(
            config.vote_master_key(),
            config.signing_key(),
            config.justification_key(),
        )
    }
}

impl KeyProvider for StaticKeys {
    fn vote_master_key(&self) -> &SymmetricKey {
        &self.vote_master
    }

    fn signing_key(&self) -> &SymmetricKey {
        &self.signing
    }

    fn justification_key(&self) -> &SymmetricKey {
        &self.justification
    }
}

/// Cost parameters for the password-based key derivation (Argon2id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub mem_cost: u32,
    /// Number of passes.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub lanes: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost: 19 * 1024,
            time_cost: 2,
            lanes: 1,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
pub(crate) mod examples {
    use super::*;

    impl StaticKeys {
        pub fn example() -> Self {
            Self::from_secrets("test-master", "test-signing", "test-justification")
        }
    }

    impl KdfParams {
        /// The cheapest parameters Argon2 accepts, so tests stay fast.
        pub fn fast() -> Self {
            Self {
                mem_cost: 8,
                time_cost: 1,
                lanes: 1,
            }
        }
    }
}
