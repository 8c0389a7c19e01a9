//! API endpoint handlers.
//!
//! Each module corresponds to a portal screen or feature. Handlers reuse
//! the service modules (`accounts`, `assessments`, `dashboard`, ...) and
//! run them on the blocking pool, since SQLite, password hashing and the
//! outbound integrations all block.

pub mod admin;
pub mod assessments;
pub mod auth;
pub mod clinician;
pub mod dashboard;
pub mod health;
pub mod modules;
pub mod notifications;
pub mod profile;
pub mod uploads;

use rusqlite::Connection;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Run `work` on the blocking pool with a fresh database connection.
pub(crate) async fn with_db<T, F>(ctx: &ApiContext, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&CoreState, &Connection) -> Result<T, ApiError> + Send + 'static,
{
    let core = ctx.core.clone();
    tokio::task::spawn_blocking(move || {
        let conn = core.open_db()?;
        work(&core, &conn)
    })
    .await?
}

/// Parse a path id, reporting `label` on failure.
pub(crate) fn parse_id(raw: &str, label: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {label} ID: {e}")))
}

/// Clamp a client-supplied page size.
pub(crate) fn page_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max)
}
