use std::str::FromStr;

use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

/// Hashing primitive used for newly written digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordScheme {
    Bcrypt,
    Argon2id,
}

impl FromStr for PasswordScheme {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bcrypt" => Ok(PasswordScheme::Bcrypt),
            "argon2" | "argon2id" => Ok(PasswordScheme::Argon2id),
            other => Err(AuthError::Config(format!(
                "unsupported PASSWORD_HASH_SCHEME '{other}'"
            ))),
        }
    }
}

/// Salted one-way password hashing and verification.
///
/// Verification picks the algorithm from the stored digest itself, so
/// accounts hashed under a previous scheme keep working.
#[derive(Clone)]
pub struct PasswordService {
    scheme: PasswordScheme,
    bcrypt_cost: u32,
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new(scheme: PasswordScheme, bcrypt_cost: u32) -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(19 * 1024); // 19 MiB
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Ok(Self {
            scheme,
            bcrypt_cost,
            argon2,
        })
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        match self.scheme {
            PasswordScheme::Bcrypt => Ok(bcrypt::hash(password, self.bcrypt_cost)?),
            PasswordScheme::Argon2id => {
                let mut salt_bytes = [0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt_bytes);
                let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
                let hash = self
                    .argon2
                    .hash_password(password.as_bytes(), &salt)
                    .map_err(AuthError::from)?
                    .to_string();
                Ok(hash)
            }
        }
    }

    /// Compare `password` against a stored digest.
    ///
    /// A missing digest is a mismatch and never reaches the comparison routine.
    /// Unreadable digests are logged and also treated as a mismatch.
    pub fn verify_password(&self, password: &str, digest: Option<&str>) -> bool {
        let Some(digest) = digest.filter(|d| !d.is_empty()) else {
            return false;
        };

        let outcome = if is_bcrypt_digest(digest) {
            bcrypt::verify(password, digest).map_err(AuthError::from)
        } else {
            self.verify_argon2(password, digest)
        };

        match outcome {
            Ok(matched) => matched,
            Err(err) => {
                log::error!("stored password digest could not be verified: {}", err);
                false
            }
        }
    }

    fn verify_argon2(&self, password: &str, digest: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(digest)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    /// [`Self::hash_password`] on the blocking pool.
    pub async fn hash_password_blocking(&self, password: String) -> AuthResult<String> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.hash_password(&password)).await?
    }

    /// [`Self::verify_password`] on the blocking pool.
    pub async fn verify_password_blocking(
        &self,
        password: String,
        digest: Option<String>,
    ) -> AuthResult<bool> {
        let service = self.clone();
        let matched =
            tokio::task::spawn_blocking(move || service.verify_password(&password, digest.as_deref()))
                .await?;
        Ok(matched)
    }
}

fn is_bcrypt_digest(digest: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| digest.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lowest cost bcrypt accepts; keeps the suite fast.
    const TEST_COST: u32 = 4;

    #[test]
    fn hashes_and_verifies_bcrypt_passwords() {
        let service = PasswordService::new(PasswordScheme::Bcrypt, TEST_COST).expect("service");
        let hash = service.hash_password("super-secret").expect("hash generation");

        assert!(hash.starts_with("$2"));
        assert!(service.verify_password("super-secret", Some(&hash)));
        assert!(!service.verify_password("wrong-password", Some(&hash)));
    }

    #[test]
    fn hashes_and_verifies_argon2_passwords() {
        let service = PasswordService::new(PasswordScheme::Argon2id, TEST_COST).expect("service");
        let hash = service.hash_password("super-secret").expect("hash generation");

        assert!(hash.starts_with("$argon2id$"));
        assert!(service.verify_password("super-secret", Some(&hash)));
        assert!(!service.verify_password("wrong-password", Some(&hash)));
    }

    #[test]
    fn verifies_digests_written_under_another_scheme() {
        let argon = PasswordService::new(PasswordScheme::Argon2id, TEST_COST).expect("service");
        let bcrypt = PasswordService::new(PasswordScheme::Bcrypt, TEST_COST).expect("service");

        let legacy = argon.hash_password("rotate-me-please").expect("hash");
        assert!(bcrypt.verify_password("rotate-me-please", Some(&legacy)));
    }

    #[test]
    fn missing_or_garbled_digest_fails_closed() {
        let service = PasswordService::new(PasswordScheme::Bcrypt, TEST_COST).expect("service");

        assert!(!service.verify_password("anything", None));
        assert!(!service.verify_password("anything", Some("")));
        assert!(!service.verify_password("anything", Some("not-a-digest")));
        assert!(!service.verify_password("anything", Some("$2b$10$truncated")));
    }

    #[test]
    fn parses_scheme_names() {
        assert_eq!("bcrypt".parse::<PasswordScheme>().unwrap(), PasswordScheme::Bcrypt);
        assert_eq!("Argon2id".parse::<PasswordScheme>().unwrap(), PasswordScheme::Argon2id);
        assert!("md5".parse::<PasswordScheme>().is_err());
    }

    #[tokio::test]
    async fn blocking_variants_agree_with_inline_calls() {
        let service = PasswordService::new(PasswordScheme::Bcrypt, TEST_COST).expect("service");
        let hash = service
            .hash_password_blocking("off-the-runtime".into())
            .await
            .expect("hash");

        assert!(
            service
                .verify_password_blocking("off-the-runtime".into(), Some(hash.clone()))
                .await
                .expect("join")
        );
        assert!(
            !service
                .verify_password_blocking("off-the-runtime".into(), None)
                .await
                .expect("join")
        );
    }
}
