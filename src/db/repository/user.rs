use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, now, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const USER_COLUMNS: &str = "id, email, name, password_hash, role, status, email_verified, phone,
     date_of_birth, gender, specialty, license_number, avatar_url, created_at, updated_at";

/// Filter for the admin user listing.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    /// Case-insensitive match on name or email.
    pub search: Option<String>,
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, email, name, password_hash, role, status, email_verified, phone,
         date_of_birth, gender, specialty, license_number, avatar_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            user.id.to_string(),
            user.email,
            user.name,
            user.password_hash,
            user.role.as_str(),
            user.status.as_str(),
            user.email_verified as i32,
            user.phone,
            user.date_of_birth.map(|d| d.to_string()),
            user.gender,
            user.specialty,
            user.license_number,
            user.avatar_url,
            format_timestamp(&user.created_at),
            format_timestamp(&user.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_user_row)
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
    let row = conn
        .query_row(&sql, params![email.trim().to_lowercase()], read_user_row)
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn list_users(conn: &Connection, filter: &UserFilter) -> Result<Vec<User>, DatabaseError> {
    let mut sql = format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1");
    let mut values: Vec<String> = Vec::new();

    if let Some(role) = filter.role {
        values.push(role.as_str().to_string());
        sql.push_str(&format!(" AND role = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(status.as_str().to_string());
        sql.push_str(&format!(" AND status = ?{}", values.len()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        values.push(format!("%{}%", search.to_lowercase()));
        let n = values.len();
        sql.push_str(&format!(" AND (LOWER(name) LIKE ?{n} OR email LIKE ?{n})"));
    }
    sql.push_str(" ORDER BY created_at DESC, name ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), read_user_row)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(user_from_row(row?)?);
    }
    Ok(users)
}

/// Active users holding `role` (notification fan-out targets).
pub fn list_active_user_ids_by_role(conn: &Connection, role: Role) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM users WHERE role = ?1 AND status = 'active' ORDER BY created_at",
    )?;
    let ids = stmt
        .query_map(params![role.as_str()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|s| parse_uuid(s)).collect()
}

pub fn update_profile(conn: &Connection, id: &Uuid, update: &ProfileUpdate) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET
            name = COALESCE(?2, name),
            phone = COALESCE(?3, phone),
            date_of_birth = COALESCE(?4, date_of_birth),
            gender = COALESCE(?5, gender),
            specialty = COALESCE(?6, specialty),
            avatar_url = COALESCE(?7, avatar_url),
            updated_at = ?8
         WHERE id = ?1",
        params![
            id.to_string(),
            update.name,
            update.phone,
            update.date_of_birth.map(|d| d.to_string()),
            update.gender,
            update.specialty,
            update.avatar_url,
            format_timestamp(&now()),
        ],
    )?;
    ensure_changed(changed, id)
}

pub fn update_status(conn: &Connection, id: &Uuid, status: UserStatus) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), format_timestamp(&now())],
    )?;
    ensure_changed(changed, id)
}

pub fn update_role(conn: &Connection, id: &Uuid, role: Role) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), role.as_str(), format_timestamp(&now())],
    )?;
    ensure_changed(changed, id)
}

pub fn update_password_hash(conn: &Connection, id: &Uuid, password_hash: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), password_hash, format_timestamp(&now())],
    )?;
    ensure_changed(changed, id)
}

pub fn mark_email_verified(conn: &Connection, email: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET email_verified = 1, updated_at = ?2 WHERE email = ?1",
        params![email.trim().to_lowercase(), format_timestamp(&now())],
    )?;
    Ok(changed > 0)
}

/// `(role, status, count)` for every populated combination.
pub fn count_users_by_role_status(conn: &Connection) -> Result<Vec<(Role, UserStatus, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT role, status, COUNT(*) FROM users GROUP BY role, status ORDER BY role, status",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(role, status, count)| Ok((Role::from_str(&role)?, UserStatus::from_str(&status)?, count)))
        .collect()
}

pub fn admin_exists(conn: &Connection) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')",
        [],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(exists)
}

fn ensure_changed(changed: usize, id: &Uuid) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "User".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

type UserRow = (
    String, String, String, String, String, String, i32,
    Option<String>, Option<String>, Option<String>, Option<String>,
    Option<String>, Option<String>, String, String,
);

fn read_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
    ))
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    let (
        id, email, name, password_hash, role, status, email_verified, phone,
        date_of_birth, gender, specialty, license_number, avatar_url, created_at, updated_at,
    ) = row;
    Ok(User {
        id: parse_uuid(&id)?,
        email,
        name,
        password_hash,
        role: Role::from_str(&role)?,
        status: UserStatus::from_str(&status)?,
        email_verified: email_verified != 0,
        phone,
        date_of_birth: date_of_birth.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        gender,
        specialty,
        license_number,
        avatar_url,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}
