//! Argon2id password hashing for admin users.
//!
//! Hashes are stored in PHC string format, e.g.
//! `$argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>`.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use thiserror::Error;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password is required")]
    Required,
    #[error("password is too short (minimum {MIN_PASSWORD_LENGTH} characters)")]
    TooShort,
    #[error("password hashing failed")]
    Hash,
}

pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.trim().is_empty() {
        return Err(PasswordError::Required);
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

/// Hash a password with Argon2id default parameters.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    validate_password(password)?;
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| PasswordError::Hash)
}

/// Constant-time verification against a PHC-encoded hash.
pub fn verify_password(password: &str, phc_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn short_passwords_rejected() {
        assert_eq!(hash_password(""), Err(PasswordError::Required));
        assert_eq!(hash_password("     "), Err(PasswordError::Required));
        assert_eq!(hash_password("12345"), Err(PasswordError::TooShort));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
