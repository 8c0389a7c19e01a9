//! Signed session tokens.
//!
//! Compact JWS (`header.claims.signature`, base64url without padding)
//! signed with HMAC-SHA256. The claims are copied from the user record at
//! login and read back on every authenticated request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroize;

use super::{random_bytes, CryptoError};
use crate::models::enums::Role;
use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;
const KEY_SALT: &[u8] = b"cdss-session-token";
const KEY_INFO: &[u8] = b"hs256-signing-key-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

impl SessionClaims {
    pub fn for_user(user: &User, issued_at: i64, ttl_secs: i64) -> Self {
        Self {
            sub: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            iat: issued_at,
            exp: issued_at + ttl_secs,
        }
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// HMAC signing key derived from the configured secret, zeroed on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct TokenSigner {
    key: [u8; 32],
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(Some(KEY_SALT), secret);
        let mut key = [0u8; 32];
        hk.expand(KEY_INFO, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(Self { key })
    }

    /// Signer over a fresh random secret. Tokens do not survive a restart.
    pub fn ephemeral() -> Result<Self, CryptoError> {
        let secret: [u8; 32] = random_bytes();
        Self::new(&secret)
    }

    fn mac(&self, signing_input: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| CryptoError::KeyDerivation)?;
        mac.update(signing_input);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    pub fn sign(&self, claims: &SessionClaims) -> Result<String, CryptoError> {
        let header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signing_input = format!("{header}.{payload}");
        let signature = URL_SAFE_NO_PAD.encode(self.mac(signing_input.as_bytes())?);
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify structure, algorithm, signature and expiry against `now` (unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, CryptoError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::TokenInvalid);
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| CryptoError::TokenInvalid)?;
        let parsed: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| CryptoError::TokenInvalid)?;
        if parsed.alg != "HS256" {
            return Err(CryptoError::TokenInvalid);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CryptoError::TokenInvalid)?;
        let expected = self.mac(format!("{header}.{payload}").as_bytes())?;
        if !bool::from(expected.ct_eq(&provided)) {
            return Err(CryptoError::TokenInvalid);
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CryptoError::TokenInvalid)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload_bytes).map_err(|_| CryptoError::TokenInvalid)?;
        if claims.exp <= now {
            return Err(CryptoError::TokenExpired);
        }
        Ok(claims)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, CryptoError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::UserStatus;
    use crate::test_support::user_fixture;

    fn claims(now: i64) -> SessionClaims {
        let user = user_fixture("jane@example.com", Role::Clinician, UserStatus::Active);
        SessionClaims::for_user(&user, now, 3600)
    }

    #[test]
    fn sign_and_verify() {
        let signer = TokenSigner::new(b"test-secret").unwrap();
        let c = claims(1_000);
        let token = signer.sign(&c).unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(signer.verify_at(&token, 1_500).unwrap(), c);
    }

    #[test]
    fn expired_token_is_distinct_from_invalid() {
        let signer = TokenSigner::new(b"test-secret").unwrap();
        let token = signer.sign(&claims(1_000)).unwrap();
        assert!(matches!(signer.verify_at(&token, 4_600), Err(CryptoError::TokenExpired)));
    }

    #[test]
    fn other_secret_rejects() {
        let a = TokenSigner::new(b"secret-a").unwrap();
        let b = TokenSigner::new(b"secret-b").unwrap();
        let token = a.sign(&claims(1_000)).unwrap();
        assert!(matches!(b.verify_at(&token, 1_500), Err(CryptoError::TokenInvalid)));
    }

    #[test]
    fn tampered_claims_reject() {
        let signer = TokenSigner::new(b"test-secret").unwrap();
        let token = signer.sign(&claims(1_000)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut forged = claims(1_000);
        forged.role = Role::Admin;
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(matches!(signer.verify_at(&tampered, 1_500), Err(CryptoError::TokenInvalid)));
    }

    #[test]
    fn alg_none_and_garbage_reject() {
        let signer = TokenSigner::new(b"test-secret").unwrap();
        let token = signer.sign(&claims(1_000)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let none_header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let unsigned = format!("{none_header}.{}.", parts[1]);

        for bad in ["", "a.b", "a.b.c.d", "!!!.@@@.###", unsigned.as_str()] {
            assert!(signer.verify_at(bad, 1_500).is_err(), "accepted {bad:?}");
        }
    }
}
