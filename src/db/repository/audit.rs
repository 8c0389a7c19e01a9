use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::DatabaseError;

/// One buffered API access record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub action: String,
    pub status: u16,
}

/// Insert a batch of audit entries in one transaction.
pub fn insert_audit_entries(conn: &Connection, entries: &[AuditEntry]) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO audit_log (timestamp, user_id, role, action, status) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for e in entries {
            stmt.execute(params![e.timestamp, e.user_id, e.role, e.action, e.status])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Prune audit entries older than the given number of days.
pub fn prune_audit_log(conn: &Connection, retention_days: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < datetime('now', ?1)",
        params![format!("-{retention_days} days")],
    )?;
    Ok(deleted)
}

/// Most recent entries, optionally for one user.
pub fn query_recent_audit(
    conn: &Connection,
    user_id: Option<&str>,
    limit: u32,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, user_id, role, action, status FROM audit_log
         WHERE (?1 IS NULL OR user_id = ?1)
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, limit], |row| {
            Ok(AuditEntry {
                timestamp: row.get(0)?,
                user_id: row.get(1)?,
                role: row.get(2)?,
                action: row.get(3)?,
                status: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
