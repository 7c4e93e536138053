//! Password hashing.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("invalid argon2 parameters")]
    Params(#[source] argon2::Error),
    #[error("failed to hash password")]
    Hash(#[source] argon2::password_hash::Error),
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(CryptoError::Params)?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id with a fresh random salt.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(CryptoError::Hash)?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC string.
    ///
    /// A malformed PHC string never matches.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        let Ok(parsed) = PasswordHash::new(phc_hash) else {
            return false;
        };

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
pub(crate) fn cheap_password_manager() -> PasswordManager {
    PasswordManager::new(Some(ArgonConfig {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let pwd = cheap_password_manager();
        let hash = pwd.hash_password("p1").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(pwd.verify_password("p1", &hash));
        assert!(!pwd.verify_password("p2", &hash));
    }

    #[test]
    fn test_salted() {
        let pwd = cheap_password_manager();
        let first = pwd.hash_password("same").unwrap();
        let second = pwd.hash_password("same").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_params() {
        let err = PasswordManager::new(Some(ArgonConfig {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 2,
        }))
        .unwrap_err();

        assert!(matches!(err, CryptoError::Params(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_malformed_hash() {
        let pwd = cheap_password_manager();
        assert!(!pwd.verify_password("p1", "not-a-phc-string"));
    }
}
