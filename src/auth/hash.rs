//! Password hashing and token digest primitives.
//!
//! Passwords use Argon2id with a per-hash salt; the stored verifier is a
//! self-describing PHC string. Tokens are random URL-safe strings whose
//! SHA-256 hex digest is the only thing ever written to the database.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng as SaltRng},
};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use super::error::AuthError;

/// A well-formed Argon2id verifier that matches no password.
///
/// `authenticate` runs a verify against this when the user does not exist,
/// so the response time does not reveal which usernames are taken. The
/// parameters match `Argon2::default()` so the work factor is the same as
/// for a real verifier.
pub(crate) const DUMMY_VERIFIER: &str = "$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Hash a plaintext password into a PHC-format Argon2id verifier.
pub fn password_hash(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut SaltRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(AuthError::Hash)
}

/// Verify a plaintext password against a stored PHC verifier.
///
/// Returns `Ok(false)` on mismatch; an error only means the stored
/// verifier itself is malformed.
pub fn password_verify(verifier: &str, plain: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(verifier).map_err(AuthError::Hash)?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(AuthError::Hash(err)),
    }
}

/// Burn one verify worth of time without authenticating anyone.
pub(crate) fn dummy_verify(plain: &str) {
    let _ = password_verify(DUMMY_VERIFIER, plain);
}

/// SHA-256 hex digest of a raw token; the stored form of every token.
#[must_use]
pub fn digest_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Random URL-safe string from `n_bytes` of OS entropy.
///
/// The raw value is only ever sent to the user (cookie or email link);
/// callers store `digest_token` of it.
pub fn random_url_safe(n_bytes: usize) -> Result<String, AuthError> {
    let mut bytes = vec![0u8; n_bytes];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn hash_then_verify_round_trip() {
        let verifier = password_hash("hunter2").expect("hash");
        assert!(verifier.starts_with("$argon2id$"));
        assert_eq!(password_verify(&verifier, "hunter2").ok(), Some(true));
        assert_eq!(password_verify(&verifier, "wrong").ok(), Some(false));
    }

    #[test]
    fn same_password_hashes_differently() {
        let first = password_hash("hunter2").expect("hash");
        let second = password_hash("hunter2").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_verifier_is_an_error() {
        assert!(password_verify("not-a-hash", "pw").is_err());
    }

    #[test]
    fn dummy_verifier_parses_and_never_matches() {
        assert_eq!(password_verify(DUMMY_VERIFIER, "anything").ok(), Some(false));
        assert_eq!(password_verify(DUMMY_VERIFIER, "").ok(), Some(false));
    }

    #[test]
    fn digest_is_stable_hex() {
        let first = digest_token("token");
        let second = digest_token("token");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, digest_token("other"));
    }

    #[test]
    fn random_url_safe_decodes_to_requested_size() {
        for size in [12, 32] {
            let raw = random_url_safe(size).expect("rng");
            let decoded = URL_SAFE_NO_PAD.decode(raw.as_bytes()).expect("base64");
            assert_eq!(decoded.len(), size);
        }
    }

    #[test]
    fn random_url_safe_values_differ() {
        let first = random_url_safe(32).expect("rng");
        let second = random_url_safe(32).expect("rng");
        assert_ne!(first, second);
    }
}
