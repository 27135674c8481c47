//! One-way secret verification against stored Argon2 PHC hashes.

use anyhow::{anyhow, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::{rngs::OsRng, RngCore};

/// Verify a plaintext secret against a stored PHC hash string.
///
/// The digest comparison is constant time. A stored hash that cannot be parsed
/// is treated as a failed verification, never as a panic.
#[must_use]
pub fn verify(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Stand-in hash verified when no stored hash exists, so an unknown identifier
/// costs the same Argon2 work as a wrong secret. Uses the default parameters.
const UNKNOWN_PRINCIPAL_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Spend one verification on a principal that does not exist.
pub fn verify_unknown(secret: &str) {
    std::hint::black_box(verify(secret, UNKNOWN_PRINCIPAL_HASH));
}

/// Returns true when `stored_hash` is a PHC string this verifier understands.
#[must_use]
pub fn is_well_formed(stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok()
}

/// Hash a secret with a random salt, producing a PHC string accepted by [`verify`].
///
/// # Errors
/// Returns an error if salt encoding or hashing fails.
pub fn hash_secret(secret: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|err| anyhow!("{err}"))?;

    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|err| anyhow!("{err}"))?;

    Ok(hash.to_string())
}
