//! # auth-adapters
//!
//! Argon2id implementation of the `PasswordDigest` port, plus the helper the
//! seeder uses to produce stored credentials in the same encoding `AuthService`
//! reads back (standard base64 for both digest and salt).

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use domains::{DomainError, PasswordDigest, Result};
use tracing::instrument;
use uuid::Uuid;

/// Raw digest length in bytes.
pub const DIGEST_LEN: usize = 32;

pub struct Argon2Digest {
    hasher: Argon2<'static>,
}

impl Default for Argon2Digest {
    fn default() -> Self {
        Self {
            hasher: Argon2::default(),
        }
    }
}

impl Argon2Digest {
    /// Custom cost parameters; tests use cheap ones.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(DIGEST_LEN))
            .map_err(|e| DomainError::Internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self {
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// A fresh random salt and the digest of `password` under it, both base64
    /// encoded as stored in the users table.
    pub fn new_credentials(&self, password: &str) -> Result<(String, String)> {
        let salt = Uuid::new_v4();
        let digest = self.digest(password.as_bytes(), salt.as_bytes())?;
        Ok((STANDARD.encode(digest), STANDARD.encode(salt.as_bytes())))
    }
}

impl PasswordDigest for Argon2Digest {
    #[instrument(skip_all)]
    fn digest(&self, password: &[u8], salt: &[u8]) -> Result<Vec<u8>> {
        let mut out = vec![0u8; DIGEST_LEN];
        self.hasher
            .hash_password_into(password, salt, &mut out)
            .map_err(|e| DomainError::Internal(format!("argon2 failed: {e}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cheap() -> Argon2Digest {
        Argon2Digest::with_params(64, 1, 1).unwrap()
    }

    #[test]
    fn test_digest_is_deterministic() {
        let d = cheap();
        let a = d.digest(b"hunter2", b"saltsalt").unwrap();
        let b = d.digest(b"hunter2", b"saltsalt").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_LEN);
    }

    #[test]
    fn test_short_salt_is_an_error() {
        let err = cheap().digest(b"pw", b"short").unwrap_err();
        assert!(matches!(err, DomainError::Internal(_)));
    }

    #[test]
    fn test_new_credentials_verify() {
        let d = cheap();
        let (digest, salt) = d.new_credentials("correct horse").unwrap();
        let salt = STANDARD.decode(salt).unwrap();
        assert_eq!(salt.len(), 16);
        assert_eq!(
            STANDARD.decode(digest).unwrap(),
            d.digest(b"correct horse", &salt).unwrap()
        );
    }

    #[test]
    fn test_fresh_salt_each_time() {
        let d = cheap();
        let (a, _) = d.new_credentials("same").unwrap();
        let (b, _) = d.new_credentials("same").unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_different_passwords_differ(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
            prop_assume!(a != b);
            let d = cheap();
            prop_assert_ne!(
                d.digest(a.as_bytes(), b"saltsalt").unwrap(),
                d.digest(b.as_bytes(), b"saltsalt").unwrap()
            );
        }
    }
}
