use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::{random_bytes, CryptoError};

pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 32;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

const SCHEME: &str = "pbkdf2-sha256";

/// Derived password hash, zeroed on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
struct DerivedHash([u8; HASH_LENGTH]);

impl DerivedHash {
    fn derive(password: &str, salt: &[u8], iterations: u32) -> Self {
        let mut out = [0u8; HASH_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
        Self(out)
    }
}

/// Hash a password as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt: [u8; SALT_LENGTH] = random_bytes();
    let derived = DerivedHash::derive(password, &salt, iterations);
    format!(
        "{SCHEME}${iterations}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(derived.0)
    )
}

/// Check a password against an encoded hash. The iteration count is read
/// from the hash so work-factor changes don't invalidate stored accounts.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, CryptoError> {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CryptoError::InvalidHashFormat);
    };

    let iterations: u32 = iterations.parse().map_err(|_| CryptoError::InvalidHashFormat)?;
    if iterations == 0 {
        return Err(CryptoError::InvalidHashFormat);
    }
    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|_| CryptoError::InvalidHashFormat)?;
    let expected = STANDARD_NO_PAD
        .decode(expected)
        .map_err(|_| CryptoError::InvalidHashFormat)?;
    if expected.len() != HASH_LENGTH {
        return Err(CryptoError::InvalidHashFormat);
    }

    let derived = DerivedHash::derive(password, &salt, iterations);
    Ok(derived.0[..].ct_eq(&expected[..]).into())
}

/// 8–128 characters with at least one letter and one digit.
pub fn validate_password_policy(password: &str) -> Result<(), CryptoError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(CryptoError::WeakPassword("must be at least 8 characters"));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(CryptoError::WeakPassword("must be at most 128 characters"));
    }
    if !password.chars().any(char::is_alphabetic) {
        return Err(CryptoError::WeakPassword("must contain a letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(CryptoError::WeakPassword("must contain a digit"));
    }
    Ok(())
}
