//! Credential hashing and verification using argon2id
//!
//! Every credential in the system (tenant API keys, relay keys, publisher
//! join tokens) is stored as a salted argon2id PHC string. Because each hash
//! carries its own salt there is no way to look a credential up by hash; the
//! only way to resolve one is [`CredentialHasher::find_match`], a linear scan
//! that runs the constant-time verifier against each candidate.

use crate::config::HashingConfig;
use crate::errors::{AppError, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

/// Argon2id hasher with configurable cost
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("params", self.argon2.params())
            .finish()
    }
}

impl CredentialHasher {
    /// Build a hasher from configured cost parameters
    pub fn new(config: &HashingConfig) -> Result<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| AppError::Configuration {
                message: format!("Invalid argon2 parameters: {}", e),
            })?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a secret with a fresh random salt
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal {
                message: format!("Failed to hash credential: {}", e),
            })
    }

    /// Verify a secret against a stored hash. Unparseable hashes never match.
    pub fn verify(&self, secret: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            tracing::warn!("Stored credential hash is not a valid PHC string");
            return false;
        };

        self.argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }

    /// Return the key of the first candidate whose hash matches `secret`.
    ///
    /// Cost is O(candidates) argon2 verifications. This is the intended
    /// lookup for salted credentials; do not replace it with an equality
    /// lookup on a deterministic digest, which would reintroduce a timing
    /// side channel on the index.
    pub fn find_match<K>(&self, secret: &str, candidates: impl IntoIterator<Item = (K, String)>) -> Option<K> {
        candidates
            .into_iter()
            .find(|(_, hash)| self.verify(secret, hash))
            .map(|(key, _)| key)
    }

    /// [`find_match`](Self::find_match) on the blocking thread pool, so that
    /// argon2 work never stalls the async runtime
    pub async fn find_match_blocking<K>(&self, secret: String, candidates: Vec<(K, String)>) -> Result<Option<K>>
    where
        K: Send + 'static,
    {
        let hasher = self.clone();
        let found = tokio::task::spawn_blocking(move || hasher.find_match(&secret, candidates)).await?;
        Ok(found)
    }
}
