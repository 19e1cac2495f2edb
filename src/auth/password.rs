use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::HashConfig;

/// Salted Argon2id hashing with a configurable cost.
#[derive(Clone)]
pub struct Passwords {
    params: Params,
}

impl Passwords {
    pub fn new(cfg: &HashConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {}", e))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Checks `plain` against a PHC string. The cost stored in the string
    /// wins over the configured one, so old hashes keep verifying.
    pub fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
pub(crate) fn cheap_config() -> HashConfig {
    HashConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passwords() -> Passwords {
        Passwords::new(&cheap_config()).expect("params")
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let pw = passwords();
        let hash = pw.hash("Secur3P@ssw0rd!").expect("hashing should succeed");
        assert!(pw.verify("Secur3P@ssw0rd!", &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let pw = passwords();
        let hash = pw.hash("correct-horse-battery-staple").expect("hashing should succeed");
        assert!(!pw.verify("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn hash_is_salted_and_never_contains_plaintext() {
        let pw = passwords();
        let a = pw.hash("same-password").unwrap();
        let b = pw.hash("same-password").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("same-password"));
        assert!(a.starts_with("$argon2id$"));
    }

    #[test]
    fn verify_uses_cost_embedded_in_hash() {
        let strong = Passwords::new(&HashConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        let hash = strong.hash("pw").unwrap();
        assert!(passwords().verify("pw", &hash).unwrap());
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = passwords().verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn rejects_invalid_params() {
        let cfg = HashConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 0,
        };
        assert!(Passwords::new(&cfg).is_err());
    }
}
