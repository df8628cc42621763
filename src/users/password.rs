use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::{error, warn};

use super::error::{UserError, UserResult};

/// Result of checking a candidate password against a stored digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch,
    /// Correct password, but the digest uses outdated parameters.
    RehashNeeded,
}

impl Verification {
    pub fn is_match(self) -> bool {
        !matches!(self, Verification::Mismatch)
    }
}

pub fn hash_password(plain: &str) -> UserResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            UserError::Hash(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(hash: &str, plain: &str) -> Verification {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "stored digest is not a valid PHC string");
            return Verification::Mismatch;
        }
    };
    if Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_err()
    {
        return Verification::Mismatch;
    }
    if is_outdated(&parsed) {
        Verification::RehashNeeded
    } else {
        Verification::Match
    }
}

fn is_outdated(parsed: &PasswordHash<'_>) -> bool {
    if parsed.algorithm != Algorithm::default().ident() {
        return true;
    }
    if parsed.version != Some(Version::default().into()) {
        return true;
    }
    let current = Params::default();
    match Params::try_from(parsed) {
        Ok(p) => {
            p.m_cost() != current.m_cost()
                || p.t_cost() != current.t_cost()
                || p.p_cost() != current.p_cost()
        }
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert_eq!(verify_password(&hash, password), Verification::Match);
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple").expect("hashing should succeed");
        assert_eq!(verify_password(&hash, "wrong-password"), Verification::Mismatch);
    }

    #[test]
    fn same_input_hashes_differently() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "same").is_match());
        assert!(verify_password(&b, "same").is_match());
    }

    #[test]
    fn malformed_digest_is_a_mismatch() {
        assert_eq!(verify_password("not-a-valid-hash", "anything"), Verification::Mismatch);
        assert_eq!(verify_password("", "anything"), Verification::Mismatch);
    }

    #[test]
    fn weak_parameters_ask_for_rehash() {
        let weak = Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(8, 1, 1, None).unwrap(),
        );
        let salt = SaltString::generate(&mut OsRng);
        let hash = weak.hash_password(b"legacy", &salt).unwrap().to_string();

        assert_eq!(verify_password(&hash, "legacy"), Verification::RehashNeeded);
        assert_eq!(verify_password(&hash, "other"), Verification::Mismatch);
    }

    #[test]
    fn other_argon2_variant_asks_for_rehash() {
        let argon2i = Argon2::new(Algorithm::Argon2i, Version::V0x13, Params::default());
        let salt = SaltString::generate(&mut OsRng);
        let hash = argon2i.hash_password(b"legacy", &salt).unwrap().to_string();

        assert_eq!(verify_password(&hash, "legacy"), Verification::RehashNeeded);
    }
}
