//! One-time passcodes for email verification and password reset.
//!
//! Codes live only in memory: a restart invalidates outstanding codes.
//! Only a SHA-256 hash of each code is kept.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

const CODE_TTL: Duration = Duration::from_secs(10 * 60);
const MAX_ATTEMPTS: u32 = 5;
const MIN_INTERVAL: Duration = Duration::from_secs(60);
const HOURLY_WINDOW: Duration = Duration::from_secs(3600);
const MAX_PER_HOUR: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    VerifyEmail,
    ResetPassword,
}

impl OtpPurpose {
    pub fn subject(self) -> &'static str {
        match self {
            Self::VerifyEmail => "Verify your email address",
            Self::ResetPassword => "Reset your password",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OtpError {
    #[error("Too many code requests; retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("No active code for this address")]
    NotFound,

    #[error("Code has expired")]
    Expired,

    #[error("Code is incorrect")]
    Mismatch { remaining: u32 },

    #[error("Too many incorrect attempts; request a new code")]
    TooManyAttempts,
}

struct PendingCode {
    hash: [u8; 32],
    expires_at: Instant,
    failed_attempts: u32,
}

/// Outstanding codes plus the per-email request rate-limit map.
pub struct OtpStore {
    codes: HashMap<(String, OtpPurpose), PendingCode>,
    requests: HashMap<String, Vec<Instant>>,
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_code(code: &str) -> [u8; 32] {
    Sha256::digest(code.as_bytes()).into()
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

impl OtpStore {
    pub fn new() -> Self {
        Self {
            codes: HashMap::new(),
            requests: HashMap::new(),
        }
    }

    /// Issue a fresh code, replacing any outstanding one for the same
    /// email and purpose. The plaintext is returned for delivery only.
    pub fn issue(&mut self, email: &str, purpose: OtpPurpose) -> Result<String, OtpError> {
        self.issue_at(email, purpose, Instant::now())
    }

    fn issue_at(&mut self, email: &str, purpose: OtpPurpose, now: Instant) -> Result<String, OtpError> {
        let email = normalize(email);
        self.check_rate(&email, now)?;
        self.cleanup(now);

        let code = generate_code();
        self.codes.insert(
            (email, purpose),
            PendingCode {
                hash: hash_code(&code),
                expires_at: now + CODE_TTL,
                failed_attempts: 0,
            },
        );
        Ok(code)
    }

    /// Per email: one request per minute, five per hour. Rate limit is
    /// shared across purposes.
    fn check_rate(&mut self, email: &str, now: Instant) -> Result<(), OtpError> {
        let entries = self.requests.entry(email.to_string()).or_default();
        entries.retain(|ts| now.duration_since(*ts) < HOURLY_WINDOW);

        if let Some(last) = entries.last() {
            let since = now.duration_since(*last);
            if since < MIN_INTERVAL {
                return Err(OtpError::RateLimited {
                    retry_after: (MIN_INTERVAL - since).as_secs().max(1),
                });
            }
        }
        if entries.len() >= MAX_PER_HOUR {
            let oldest = entries[0];
            let retry = HOURLY_WINDOW.saturating_sub(now.duration_since(oldest));
            return Err(OtpError::RateLimited {
                retry_after: retry.as_secs().max(1),
            });
        }

        entries.push(now);
        Ok(())
    }

    /// Verify and consume a code.
    pub fn verify(&mut self, email: &str, purpose: OtpPurpose, code: &str) -> Result<(), OtpError> {
        self.verify_at(email, purpose, code, Instant::now())
    }

    fn verify_at(
        &mut self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        now: Instant,
    ) -> Result<(), OtpError> {
        let key = (normalize(email), purpose);
        let pending = self.codes.get_mut(&key).ok_or(OtpError::NotFound)?;

        if now >= pending.expires_at {
            self.codes.remove(&key);
            return Err(OtpError::Expired);
        }

        let candidate = hash_code(code.trim());
        if bool::from(pending.hash[..].ct_eq(&candidate[..])) {
            self.codes.remove(&key);
            return Ok(());
        }

        pending.failed_attempts += 1;
        if pending.failed_attempts >= MAX_ATTEMPTS {
            self.codes.remove(&key);
            return Err(OtpError::TooManyAttempts);
        }
        Err(OtpError::Mismatch {
            remaining: MAX_ATTEMPTS - pending.failed_attempts,
        })
    }

    fn cleanup(&mut self, now: Instant) {
        self.codes.retain(|_, c| now < c.expires_at);
        self.requests.retain(|_, ts| {
            ts.last()
                .is_some_and(|last| now.duration_since(*last) < HOURLY_WINDOW)
        });
    }
}

impl Default for OtpStore {
    fn default() -> Self {
        Self::new()
    }
}
