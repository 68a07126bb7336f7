//! The ballot cryptography engine.
//!
//! Ballot payloads are sealed with AES-256-GCM under a key derived (Argon2id)
//! from the master key and the election seal hash that was active at cast
//! time. Justifications use a separate fixed key. Every ciphertext is the
//! random 96-bit nonce followed by the AEAD output, base64 encoded as a
//! single opaque string.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Config as Argon2Config, Variant, Version};
use chrono::{DateTime, Utc};
use data_encoding::BASE64;
use hmac::{Hmac, Mac};
use log::{trace, warn};
use rand::RngCore;
use rocket::serde::json::serde_json;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::common::{BallotPayload, CandidateId, ElectionId, VoterId};

pub mod digest;
pub mod keys;

pub use keys::{KdfParams, KeyProvider, StaticKeys, SymmetricKey, KEY_LEN};

pub type HmacSha256 = Hmac<Sha256>;

/// Derivation purpose for ballot payload keys.
pub const BALLOT_KEY_PURPOSE: &str = "VOTE_ENCRYPTION_KEY";

/// AES-GCM nonce length.
const NONCE_LEN: usize = 12;

/// Upper bound on a stored ballot ciphertext, base64 characters.
pub const MAX_BALLOT_CIPHERTEXT_LEN: usize = 1024;

/// Cryptographic failures. These are never expected-path outcomes.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to encrypt: {0}")]
    Encryption(String),
    #[error("Failed to decrypt: {0}")]
    Decryption(String),
    #[error("Key derivation failed: {0}")]
    KeyDerivation(#[from] argon2::Error),
}

pub struct VoteCryptography {
    keys: Arc<dyn KeyProvider>,
    kdf: KdfParams,
    /// Derived keys by `(purpose, seal hash)`. Derivation is deliberately slow
    /// and a tally derives the same key for every ballot.
    derived: RwLock<HashMap<(String, String), SymmetricKey>>,
}

impl VoteCryptography {
    pub fn new(keys: Arc<dyn KeyProvider>, kdf: KdfParams) -> Self {
        Self {
            keys,
            kdf,
            derived: RwLock::new(HashMap::new()),
        }
    }

    /// Derive the symmetric key for `purpose` under the given seal.
    ///
    /// The salt is the SHA-256 of `"{purpose}-{seal_hash}"`, so different
    /// purposes and different seals give independent keys.
    pub fn derive_key(&self, seal_hash: &str, purpose: &str) -> Result<SymmetricKey, CryptoError> {
        let cache_key = (purpose.to_string(), seal_hash.to_string());
        if let Some(key) = self
            .derived
            .read()
            .ok()
            .and_then(|cache| cache.get(&cache_key).cloned())
        {
            return Ok(key);
        }

        let salt = Sha256::digest(format!("{}-{}", purpose, seal_hash).as_bytes());
        let config = Argon2Config {
            variant: Variant::Argon2id,
            version: Version::Version13,
            mem_cost: self.kdf.mem_cost,
            time_cost: self.kdf.time_cost,
            lanes: self.kdf.lanes,
            hash_length: KEY_LEN as u32,
            ..Argon2Config::default()
        };
        let raw = argon2::hash_raw(self.keys.vote_master_key().as_bytes(), &salt, &config)?;
        let bytes: [u8; KEY_LEN] = raw
            .try_into()
            .map_err(|_| CryptoError::Encryption("derived key has wrong length".to_string()))?;
        let key = SymmetricKey::new(bytes);

        trace!("Derived {purpose} key for a new seal");
        if let Ok(mut cache) = self.derived.write() {
            cache.insert(cache_key, key.clone());
        }
        Ok(key)
    }

    /// Encrypt a ballot payload under the key derived from `seal_hash`.
    pub fn encrypt_ballot(
        &self,
        payload: &BallotPayload,
        seal_hash: &str,
    ) -> Result<String, CryptoError> {
        let json =
            serde_json::to_vec(payload).map_err(|e| CryptoError::Encryption(e.to_string()))?;
        let key = self.derive_key(seal_hash, BALLOT_KEY_PURPOSE)?;
        let ciphertext = seal(&key, &json)?;
        if ciphertext.len() > MAX_BALLOT_CIPHERTEXT_LEN {
            return Err(CryptoError::Encryption(format!(
                "ballot ciphertext is {} characters, limit is {}",
                ciphertext.len(),
                MAX_BALLOT_CIPHERTEXT_LEN
            )));
        }
        Ok(ciphertext)
    }

    /// Decrypt a ballot payload. Fails if the ciphertext is malformed or the
    /// seal hash is not the one it was encrypted under.
    pub fn decrypt_ballot(
        &self,
        ciphertext: &str,
        seal_hash: &str,
    ) -> Result<BallotPayload, CryptoError> {
        let key = self.derive_key(seal_hash, BALLOT_KEY_PURPOSE)?;
        let json = open(&key, ciphertext)?;
        serde_json::from_slice(&json).map_err(|e| CryptoError::Decryption(e.to_string()))
    }

    pub fn hash_vote(
        &self,
        vote_id: &str,
        voter_id: VoterId,
        candidate_id: Option<CandidateId>,
        voted_at: DateTime<Utc>,
    ) -> String {
        digest::vote_hash(vote_id, voter_id, candidate_id, voted_at)
    }

    pub fn creation_hash(
        &self,
        vote_id: &str,
        voter_id: VoterId,
        election_id: ElectionId,
        vote_weight: Decimal,
        created_at: DateTime<Utc>,
    ) -> String {
        digest::creation_hash(vote_id, voter_id, election_id, vote_weight, created_at)
    }

    pub fn receipt_hash(&self, vote_id: &str, receipt_token: &str, voted_at: DateTime<Utc>) -> String {
        digest::receipt_hash(vote_id, receipt_token, voted_at)
    }

    pub fn fingerprint_device(
        &self,
        user_agent: &str,
        ip_address: &str,
        extra: &BTreeMap<String, String>,
    ) -> String {
        digest::device_fingerprint(user_agent, ip_address, extra)
    }

    /// HMAC-SHA256 over `"{vote_hash}-{ciphertext}"`, base64 encoded.
    pub fn sign_vote(&self, vote_hash: &str, ciphertext: &str) -> String {
        BASE64.encode(&self.signature_mac(vote_hash, ciphertext).finalize().into_bytes())
    }

    /// Recompute the signature and compare in constant time.
    pub fn verify_integrity(&self, ciphertext: &str, vote_hash: &str, signature: &str) -> bool {
        let signature = match BASE64.decode(signature.as_bytes()) {
            Ok(signature) => signature,
            Err(_) => {
                warn!("Ballot signature is not valid base64");
                return false;
            }
        };
        self.signature_mac(vote_hash, ciphertext)
            .verify_slice(&signature)
            .is_ok()
    }

    /// Encrypt a free-text justification. Empty input stores nothing.
    pub fn encrypt_justification(
        &self,
        justification: Option<&str>,
    ) -> Result<Option<String>, CryptoError> {
        match justification {
            Some(text) if !text.is_empty() => {
                seal(self.keys.justification_key(), text.as_bytes()).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn decrypt_justification(
        &self,
        encrypted: Option<&str>,
    ) -> Result<Option<String>, CryptoError> {
        match encrypted {
            Some(ciphertext) if !ciphertext.is_empty() => {
                let bytes = open(self.keys.justification_key(), ciphertext)?;
                String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|e| CryptoError::Decryption(e.to_string()))
            }
            _ => Ok(None),
        }
    }

    fn signature_mac(&self, vote_hash: &str, ciphertext: &str) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.keys.signing_key().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(vote_hash.as_bytes());
        mac.update(b"-");
        mac.update(ciphertext.as_bytes());
        mac
    }
}

/// Encrypt with a fresh random nonce, returning base64(nonce || ciphertext).
fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let encrypted = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("AEAD encryption failed".to_string()))?;

    let mut output = Vec::with_capacity(NONCE_LEN + encrypted.len());
    output.extend_from_slice(&nonce);
    output.extend(encrypted);
    Ok(BASE64.encode(&output))
}

/// Inverse of [`seal`].
fn open(key: &SymmetricKey, ciphertext: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = BASE64
        .decode(ciphertext.as_bytes())
        .map_err(|e| CryptoError::Decryption(format!("ciphertext is not base64: {e}")))?;
    if bytes.len() <= NONCE_LEN {
        return Err(CryptoError::Decryption(
            "ciphertext is shorter than its nonce".to_string(),
        ));
    }
    let (nonce, encrypted) = bytes.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), encrypted)
        .map_err(|_| CryptoError::Decryption("wrong key or corrupt ciphertext".to_string()))
}

/// Example data for tests.
#[cfg(test)]
pub(crate) mod examples {
    use super::*;

    impl VoteCryptography {
        pub fn example() -> Self {
            Self::new(Arc::new(StaticKeys::example()), KdfParams::fast())
        }
    }
}
