//! Shared application state for every request handler.
//!
//! `CoreState` is created once at startup and shared via `Arc`. It owns the
//! configuration, the session-token signer, the in-memory OTP and login
//! lockout tables, the outbound integrations (mail, media, AI) and the
//! buffered audit log. Database connections are opened per request.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use uuid::Uuid;

use crate::accounts::LoginLockout;
use crate::analysis::{LlmClient, OllamaClient};
use crate::config::ServerConfig;
use crate::crypto::{CryptoError, SessionClaims, TokenSigner};
use crate::db::{self, AuditEntry, DatabaseError};
use crate::mail::{self, Mailer};
use crate::media::{self, MediaStore};
use crate::models::enums::Role;
use crate::models::User;
use crate::otp::OtpStore;

/// Flush the audit buffer once it holds this many entries.
const AUDIT_BUFFER_CAPACITY: usize = 100;

/// Audit rows older than this are pruned on flush.
const AUDIT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

pub struct CoreState {
    config: ServerConfig,
    signer: TokenSigner,
    otp: Mutex<OtpStore>,
    lockout: Mutex<LoginLockout>,
    mailer: Arc<dyn Mailer>,
    media: Option<Arc<dyn MediaStore>>,
    llm: Option<Arc<dyn LlmClient>>,
    audit: AuditLogger,
}

impl CoreState {
    /// Build state from configuration, wiring the configured integrations.
    pub fn new(config: ServerConfig) -> Result<Self, CoreError> {
        let signer = match &config.session_secret {
            Some(secret) => TokenSigner::new(secret.as_bytes())?,
            None => {
                tracing::warn!(
                    "CDSS_SESSION_SECRET not set; using a random secret, sessions end on restart"
                );
                TokenSigner::ephemeral()?
            }
        };

        let mailer: Arc<dyn Mailer> = Arc::from(mail::mailer_from_config(&config.mail));
        if config.mail.api_url.is_none() {
            tracing::warn!("CDSS_MAIL_URL not set; one-time codes are only logged");
        }
        let media: Option<Arc<dyn MediaStore>> =
            media::media_store_from_config(&config.media).map(Arc::from);
        let llm: Option<Arc<dyn LlmClient>> = if config.ai.enabled {
            Some(Arc::new(OllamaClient::from_config(&config.ai)))
        } else {
            None
        };

        Ok(Self {
            config,
            signer,
            otp: Mutex::new(OtpStore::new()),
            lockout: Mutex::new(LoginLockout::new()),
            mailer,
            media,
            llm,
            audit: AuditLogger::new(),
        })
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_media_store(mut self, media: Option<Arc<dyn MediaStore>>) -> Self {
        self.media = media;
        self
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmClient>>) -> Self {
        self.llm = llm;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // ── Database ────────────────────────────────────────────

    /// Open a connection to the service database.
    pub fn open_db(&self) -> Result<Connection, CoreError> {
        db::open_database(&self.config.db_path()).map_err(CoreError::Database)
    }

    // ── Sessions ────────────────────────────────────────────

    /// Sign a session token carrying the user's claims.
    pub fn issue_session(&self, user: &User) -> Result<(String, SessionClaims), CoreError> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims::for_user(user, now, self.config.session_ttl_hours * 3600);
        let token = self.signer.sign(&claims)?;
        Ok((token, claims))
    }

    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, CryptoError> {
        self.signer.verify(token)
    }

    // ── In-memory tables ────────────────────────────────────

    pub fn otp_store(&self) -> &Mutex<OtpStore> {
        &self.otp
    }

    pub fn login_lockout(&self) -> &Mutex<LoginLockout> {
        &self.lockout
    }

    // ── Integrations (blocking; call under spawn_blocking) ──

    pub fn mailer(&self) -> Arc<dyn Mailer> {
        Arc::clone(&self.mailer)
    }

    pub fn media_store(&self) -> Option<Arc<dyn MediaStore>> {
        self.media.clone()
    }

    /// The configured AI client, or `None` when AI analysis is disabled.
    pub fn llm(&self) -> Option<Arc<dyn LlmClient>> {
        self.llm.clone()
    }

    // ── Audit ───────────────────────────────────────────────

    /// Buffer one API access record, flushing when the buffer is full.
    pub fn log_access(&self, user_id: Option<&Uuid>, role: Option<Role>, action: &str, status: u16) {
        let needs_flush = self.audit.log(AuditEntry {
            timestamp: db::format_timestamp(&db::now()),
            user_id: user_id.map(|id| id.to_string()),
            role: role.map(|r| r.as_str().to_string()),
            action: action.to_string(),
            status,
        });
        if needs_flush {
            if let Err(e) = self.flush_and_prune_audit() {
                tracing::warn!("Auto-flush audit failed: {e}");
            }
        }
    }

    /// Buffered entries not yet written to the database.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    /// Flush the audit buffer and prune entries past retention.
    pub fn flush_and_prune_audit(&self) -> Result<usize, CoreError> {
        let conn = self.open_db()?;
        let count = self.audit.flush_to_db(&conn)?;
        if let Err(e) = db::prune_audit_log(&conn, AUDIT_RETENTION_DAYS) {
            tracing::warn!("Failed to prune audit log: {e}");
        }
        Ok(count)
    }
}

// ═══════════════════════════════════════════════════════════
// Audit logger: buffered API access log
// ═══════════════════════════════════════════════════════════

pub struct AuditLogger {
    buffer: Mutex<Vec<AuditEntry>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    /// Returns `true` once the buffer has reached the flush threshold.
    pub fn log(&self, entry: AuditEntry) -> bool {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(entry);
            buf.len() >= AUDIT_BUFFER_CAPACITY
        } else {
            false
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    pub fn flush_to_db(&self, conn: &Connection) -> Result<usize, CoreError> {
        let entries = self.drain();
        if entries.is_empty() {
            return Ok(0);
        }
        db::insert_audit_entries(conn, &entries)?;
        tracing::debug!(count = entries.len(), "Flushed audit entries to database");
        Ok(entries.len())
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::UserStatus;
    use crate::test_support::{test_core, user_fixture};

    fn entry(action: &str) -> AuditEntry {
        AuditEntry {
            timestamp: db::format_timestamp(&db::now()),
            user_id: None,
            role: None,
            action: action.to_string(),
            status: 200,
        }
    }

    #[test]
    fn audit_logger_signals_flush_at_capacity() {
        let logger = AuditLogger::new();
        for i in 0..AUDIT_BUFFER_CAPACITY - 1 {
            assert!(!logger.log(entry(&format!("GET /api/{i}"))));
        }
        assert!(logger.log(entry("GET /api/last")));
        assert_eq!(logger.buffer_len(), AUDIT_BUFFER_CAPACITY);
        assert_eq!(logger.drain().len(), AUDIT_BUFFER_CAPACITY);
        assert_eq!(logger.buffer_len(), 0);
    }

    #[test]
    fn flush_writes_entries_and_empties_buffer() {
        let (core, _tmp) = test_core();
        let user_id = Uuid::new_v4();
        core.log_access(Some(&user_id), Some(Role::Patient), "GET /api/profile", 200);
        core.log_access(None, None, "POST /api/auth/login", 401);
        assert_eq!(core.audit_entries().len(), 2);

        assert_eq!(core.flush_and_prune_audit().unwrap(), 2);
        assert!(core.audit_entries().is_empty());

        let conn = core.open_db().unwrap();
        let stored = db::query_recent_audit(&conn, Some(&user_id.to_string()), 10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role.as_deref(), Some("patient"));
    }

    #[test]
    fn issued_session_verifies() {
        let (core, _tmp) = test_core();
        let user = user_fixture("pat@example.com", Role::Patient, UserStatus::Active);
        let (token, claims) = core.issue_session(&user).unwrap();
        assert_eq!(claims.exp - claims.iat, core.config().session_ttl_hours * 3600);
        assert_eq!(core.verify_session(&token).unwrap(), claims);
    }

    #[test]
    fn ai_disabled_means_no_client() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::for_data_dir(tmp.path());
        config.ai.enabled = false;
        let core = CoreState::new(config).unwrap();
        assert!(core.llm().is_none());
        assert!(core.media_store().is_none());
    }
}
