//! Registration, login, profile and password flows.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::mask_email;
use crate::crypto::{self, CryptoError};
use crate::db::{self, DatabaseError};
use crate::models::enums::{Role, UserStatus};
use crate::models::{ProfileUpdate, User};
use crate::otp::{OtpError, OtpPurpose, OtpStore};

const MAX_FAILED_LOGINS: u32 = 5;
const LOCKOUT: Duration = Duration::from_secs(15 * 60);
const MAX_NAME_LENGTH: usize = 120;
const MAX_FIELD_LENGTH: usize = 255;

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is awaiting administrator approval")]
    AccountPending,

    #[error("Account is suspended")]
    AccountSuspended,

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("Too many failed sign-in attempts")]
    LockedOut { retry_after: u64 },

    #[error("Account not found")]
    NotFound,

    #[error("Current password is incorrect")]
    WrongPassword,

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
}

fn default_role() -> Role {
    Role::Patient
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_FIELD_LENGTH
        && EMAIL_PATTERN.as_ref().is_some_and(|re| re.is_match(email))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_name(name: &str) -> Result<String, AccountError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AccountError::InvalidInput("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AccountError::InvalidInput("Name is too long".into()));
    }
    Ok(name.to_string())
}

fn validate_optional_field(label: &str, value: &Option<String>) -> Result<(), AccountError> {
    match value {
        Some(v) if v.chars().count() > MAX_FIELD_LENGTH => {
            Err(AccountError::InvalidInput(format!("{label} is too long")))
        }
        _ => Ok(()),
    }
}

/// Create a patient (active) or clinician (pending approval) account.
pub fn register(conn: &Connection, input: RegisterInput, iterations: u32) -> Result<User, AccountError> {
    let name = validate_name(&input.name)?;
    let email = normalize_email(&input.email);
    if !is_valid_email(&email) {
        return Err(AccountError::InvalidInput("Email address is invalid".into()));
    }
    crypto::validate_password_policy(&input.password)?;

    let specialty = non_empty(input.specialty);
    let license_number = non_empty(input.license_number);
    let status = match input.role {
        Role::Patient => UserStatus::Active,
        Role::Clinician => {
            if specialty.is_none() || license_number.is_none() {
                return Err(AccountError::InvalidInput(
                    "Clinicians must provide a specialty and license number".into(),
                ));
            }
            UserStatus::Pending
        }
        Role::Admin => {
            return Err(AccountError::InvalidInput("Admin accounts cannot self-register".into()));
        }
    };
    let phone = non_empty(input.phone);
    let gender = non_empty(input.gender);
    for (label, value) in [
        ("Phone", &phone),
        ("Gender", &gender),
        ("Specialty", &specialty),
        ("License number", &license_number),
    ] {
        validate_optional_field(label, value)?;
    }

    if db::get_user_by_email(conn, &email)?.is_some() {
        return Err(AccountError::EmailTaken);
    }

    let ts = db::now();
    let user = User {
        id: Uuid::new_v4(),
        email,
        name,
        password_hash: crypto::hash_password(&input.password, iterations),
        role: input.role,
        status,
        email_verified: false,
        phone,
        date_of_birth: input.date_of_birth,
        gender,
        specialty,
        license_number,
        avatar_url: None,
        created_at: ts,
        updated_at: ts,
    };
    match db::insert_user(conn, &user) {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => return Err(AccountError::EmailTaken),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(user_id = %user.id, role = %user.role, email = %mask_email(&user.email), "Account registered");
    Ok(user)
}

// ═══════════════════════════════════════════════════════════
// Login lockout
// ═══════════════════════════════════════════════════════════

struct FailureWindow {
    count: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

impl FailureWindow {
    /// Locked, or failed recently enough that the count still matters.
    fn is_live(&self, now: Instant) -> bool {
        match self.locked_until {
            Some(until) => now < until,
            None => now.saturating_duration_since(self.last_failure) < LOCKOUT,
        }
    }
}

/// Consecutive failed logins per email. Five failures within 15 minutes
/// lock the email for 15 minutes; a successful login clears the counter.
pub struct LoginLockout {
    failures: HashMap<String, FailureWindow>,
}

const LOCKOUT_SWEEP_THRESHOLD: usize = 1_000;

impl LoginLockout {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
        }
    }

    /// `Err(retry_after_secs)` while locked.
    pub fn check(&mut self, email: &str) -> Result<(), u64> {
        self.check_at(email, Instant::now())
    }

    fn check_at(&mut self, email: &str, now: Instant) -> Result<(), u64> {
        let Some(window) = self.failures.get(email) else {
            return Ok(());
        };
        match window.locked_until {
            Some(until) if now < until => Err((until - now).as_secs().max(1)),
            _ => {
                if !window.is_live(now) {
                    self.failures.remove(email);
                }
                Ok(())
            }
        }
    }

    pub fn record_failure(&mut self, email: &str) {
        self.record_failure_at(email, Instant::now());
    }

    fn record_failure_at(&mut self, email: &str, now: Instant) {
        if self.failures.len() >= LOCKOUT_SWEEP_THRESHOLD {
            self.prune_at(now);
        }
        let window = self.failures.entry(email.to_string()).or_insert(FailureWindow {
            count: 0,
            last_failure: now,
            locked_until: None,
        });
        if !window.is_live(now) {
            window.count = 0;
            window.locked_until = None;
        }
        window.count += 1;
        window.last_failure = now;
        if window.count >= MAX_FAILED_LOGINS {
            window.locked_until = Some(now + LOCKOUT);
        }
    }

    /// Drop expired locks and stale failure counts.
    fn prune_at(&mut self, now: Instant) {
        self.failures.retain(|_, w| w.is_live(now));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn clear(&mut self, email: &str) {
        self.failures.remove(email);
    }
}

impl Default for LoginLockout {
    fn default() -> Self {
        Self::new()
    }
}

/// Check credentials and account state.
///
/// Unknown emails and wrong passwords fail identically, including the
/// PBKDF2 work done.
pub fn authenticate(
    conn: &Connection,
    lockout: &Mutex<LoginLockout>,
    email: &str,
    password: &str,
    require_verified_email: bool,
    iterations: u32,
) -> Result<User, AccountError> {
    let email = normalize_email(email);
    {
        let mut guard = lockout.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .check(&email)
            .map_err(|retry_after| AccountError::LockedOut { retry_after })?;
    }

    let user = db::get_user_by_email(conn, &email)?;
    let valid = match &user {
        Some(u) => crypto::verify_password(password, &u.password_hash)?,
        None => {
            let _ = crypto::hash_password(password, iterations);
            false
        }
    };

    let mut guard = lockout.lock().unwrap_or_else(|e| e.into_inner());
    let user = match (user, valid) {
        (Some(user), true) => {
            guard.clear(&email);
            user
        }
        _ => {
            guard.record_failure(&email);
            tracing::warn!(email = %mask_email(&email), "Failed sign-in");
            return Err(AccountError::InvalidCredentials);
        }
    };
    drop(guard);

    match user.status {
        UserStatus::Pending => return Err(AccountError::AccountPending),
        UserStatus::Suspended => return Err(AccountError::AccountSuspended),
        UserStatus::Active => {}
    }
    if require_verified_email && !user.email_verified {
        return Err(AccountError::EmailNotVerified);
    }
    Ok(user)
}

pub fn update_profile(conn: &Connection, user_id: &Uuid, update: ProfileUpdate) -> Result<User, AccountError> {
    let update = ProfileUpdate {
        name: match update.name {
            Some(name) => Some(validate_name(&name)?),
            None => None,
        },
        phone: non_empty(update.phone),
        date_of_birth: update.date_of_birth,
        gender: non_empty(update.gender),
        specialty: non_empty(update.specialty),
        avatar_url: non_empty(update.avatar_url),
    };
    for (label, value) in [
        ("Phone", &update.phone),
        ("Gender", &update.gender),
        ("Specialty", &update.specialty),
    ] {
        validate_optional_field(label, value)?;
    }
    if update.avatar_url.as_deref().is_some_and(|u| u.len() > 2048) {
        return Err(AccountError::InvalidInput("Avatar URL is too long".into()));
    }

    match db::update_profile(conn, user_id, &update) {
        Err(DatabaseError::NotFound { .. }) => return Err(AccountError::NotFound),
        other => other?,
    }
    db::get_user(conn, user_id)?.ok_or(AccountError::NotFound)
}

pub fn change_password(
    conn: &Connection,
    user_id: &Uuid,
    current_password: &str,
    new_password: &str,
    iterations: u32,
) -> Result<(), AccountError> {
    let user = db::get_user(conn, user_id)?.ok_or(AccountError::NotFound)?;
    if !crypto::verify_password(current_password, &user.password_hash)? {
        return Err(AccountError::WrongPassword);
    }
    crypto::validate_password_policy(new_password)?;
    db::update_password_hash(conn, user_id, &crypto::hash_password(new_password, iterations))?;
    tracing::info!(user_id = %user_id, "Password changed");
    Ok(())
}

/// Issue a code for `email`. The rate limit applies whether or not the
/// account exists; a code is only returned for delivery when it does.
pub fn request_otp(
    conn: &Connection,
    otp: &Mutex<OtpStore>,
    email: &str,
    purpose: OtpPurpose,
) -> Result<Option<String>, AccountError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AccountError::InvalidInput("Email address is invalid".into()));
    }
    let code = otp
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .issue(&email, purpose)?;

    let deliver = match db::get_user_by_email(conn, &email)? {
        Some(user) => !(purpose == OtpPurpose::VerifyEmail && user.email_verified),
        None => false,
    };
    Ok(deliver.then_some(code))
}

pub fn verify_email(conn: &Connection, otp: &Mutex<OtpStore>, email: &str, code: &str) -> Result<(), AccountError> {
    let email = normalize_email(email);
    otp.lock()
        .unwrap_or_else(|e| e.into_inner())
        .verify(&email, OtpPurpose::VerifyEmail, code)?;
    if !db::mark_email_verified(conn, &email)? {
        return Err(AccountError::NotFound);
    }
    tracing::info!(email = %mask_email(&email), "Email verified");
    Ok(())
}

pub fn reset_password(
    conn: &Connection,
    otp: &Mutex<OtpStore>,
    email: &str,
    code: &str,
    new_password: &str,
    iterations: u32,
) -> Result<(), AccountError> {
    let email = normalize_email(email);
    crypto::validate_password_policy(new_password)?;
    otp.lock()
        .unwrap_or_else(|e| e.into_inner())
        .verify(&email, OtpPurpose::ResetPassword, code)?;

    let user = db::get_user_by_email(conn, &email)?.ok_or(AccountError::NotFound)?;
    db::update_password_hash(conn, &user.id, &crypto::hash_password(new_password, iterations))?;
    tracing::info!(user_id = %user.id, "Password reset via one-time code");
    Ok(())
}
