pub mod password;
pub mod session_token;

pub use password::*;
pub use session_token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Stored password hash is malformed")]
    InvalidHashFormat,

    #[error("Password does not meet policy: {0}")]
    WeakPassword(&'static str),

    #[error("Session token is invalid")]
    TokenInvalid,

    #[error("Session token has expired")]
    TokenExpired,

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Fill a fixed-size buffer from the thread-local CSPRNG.
pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
