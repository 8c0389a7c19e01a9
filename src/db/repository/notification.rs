use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::NotificationKind;
use crate::models::Notification;

/// Insert notifications atomically: either every recipient gets one or none do.
pub fn insert_notifications(conn: &Connection, notifications: &[Notification]) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO notifications (id, user_id, kind, title, message, link, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for n in notifications {
            stmt.execute(params![
                n.id.to_string(),
                n.user_id.to_string(),
                n.kind.as_str(),
                n.title,
                n.message,
                n.link,
                n.read as i32,
                format_timestamp(&n.created_at),
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Newest first.
pub fn list_notifications(
    conn: &Connection,
    user_id: &Uuid,
    unread_only: bool,
    limit: u32,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, title, message, link, read, created_at FROM notifications
         WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
         ORDER BY created_at DESC, rowid DESC LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![user_id.to_string(), unread_only as i32, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, i32>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, user_id, kind, title, message, link, read, created_at)| {
            Ok(Notification {
                id: parse_uuid(&id)?,
                user_id: parse_uuid(&user_id)?,
                kind: NotificationKind::from_str(&kind)?,
                title,
                message,
                link,
                read: read != 0,
                created_at: parse_timestamp(&created_at),
            })
        })
        .collect()
}

pub fn count_unread(conn: &Connection, user_id: &Uuid) -> Result<u32, DatabaseError> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
        params![user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Mark one notification read. Returns false when it does not exist or
/// belongs to another user.
pub fn mark_notification_read(conn: &Connection, id: &Uuid, user_id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    Ok(changed == 1)
}

/// Returns the number of notifications that changed state.
pub fn mark_all_notifications_read(conn: &Connection, user_id: &Uuid) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
        params![user_id.to_string()],
    )?;
    Ok(changed)
}
