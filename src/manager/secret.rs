//! Share tokens and share password hashes.
//!
//! Passwords are stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>` with base64 fields, so
//! the iteration count can be raised later without invalidating existing grants.

use std::num::NonZeroU32;

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use super::ServiceError;

const TOKEN_BYTES: usize = 32;
const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;
const PBKDF2_ITERATIONS: u32 = 100_000;
const HASH_SCHEME: &str = "pbkdf2-sha256";

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

fn random_bytes<const N: usize>() -> Result<[u8; N], ServiceError> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| ServiceError::StorageUnavailable("system randomness unavailable".into()))?;
    Ok(buf)
}

/// Generate a fresh unguessable URL-safe access token.
pub fn generate_token() -> Result<String, ServiceError> {
    let bytes = random_bytes::<TOKEN_BYTES>()?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a share password with a random salt.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = random_bytes::<SALT_BYTES>()?;
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);

    let mut hash = [0u8; HASH_BYTES];
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &mut hash);

    Ok(format!(
        "{HASH_SCHEME}${}${}${}",
        iterations,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

/// Check a password against a stored hash in constant time.
/// A malformed hash never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    if scheme != HASH_SCHEME {
        return false;
    }

    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash))
    else {
        return false;
    };

    pbkdf2::verify(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &hash).is_ok()
}
