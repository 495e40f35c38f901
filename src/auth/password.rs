//! Credential hashing, strength policy, and reset-token helpers.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::DirectoryError;

const MIN_CREDENTIAL_LEN: usize = 8;

/// At least eight characters with a lowercase letter, an uppercase letter,
/// a digit, and an ASCII symbol.
pub fn is_strong(credential: &str) -> bool {
    credential.chars().count() >= MIN_CREDENTIAL_LEN
        && credential.chars().any(|c| c.is_ascii_lowercase())
        && credential.chars().any(|c| c.is_ascii_uppercase())
        && credential.chars().any(|c| c.is_ascii_digit())
        && credential.chars().any(|c| c.is_ascii_punctuation())
}

/// Argon2id PHC string for `credential`.
pub fn hash_credential(credential: &str) -> Result<String, DirectoryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(credential.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DirectoryError::Hashing(format!("hash credential: {e}")))
}

/// False for a wrong credential and for an unparseable stored hash.
pub fn verify_credential(credential: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("Stored credential hash is not a valid PHC string");
        return false;
    };
    // Parameters come from the stored hash.
    Argon2::default()
        .verify_password(credential.as_bytes(), &parsed)
        .is_ok()
}

/// 32 random bytes, base64url without padding.
pub fn generate_reset_token() -> String {
    let mut token_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut token_bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Hex SHA-256 of a reset token. Only this digest is persisted.
pub fn digest_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Constant-time digest comparison.
pub fn tokens_match(expected_digest: &str, presented_digest: &str) -> bool {
    expected_digest
        .as_bytes()
        .ct_eq(presented_digest.as_bytes())
        .into()
}
