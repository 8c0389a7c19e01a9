use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_timestamp, now, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::*;

const MODULE_COLUMNS: &str =
    "id, name, body_region, description, version, questions, conditions, active, created_at, updated_at";

pub fn insert_module(conn: &Connection, module: &DiagnosticModule) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO diagnostic_modules (id, name, body_region, description, version, questions,
         conditions, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            module.id.to_string(),
            module.name,
            module.body_region,
            module.description,
            module.version,
            serde_json::to_string(&module.questions)?,
            serde_json::to_string(&module.conditions)?,
            module.active as i32,
            format_timestamp(&module.created_at),
            format_timestamp(&module.updated_at),
        ],
    )?;
    Ok(())
}

/// Replace a module's definition and bump its version.
pub fn update_module_definition(
    conn: &Connection,
    id: &Uuid,
    definition: &ModuleDefinition,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE diagnostic_modules SET name = ?2, body_region = ?3, description = ?4,
         questions = ?5, conditions = ?6, version = version + 1, updated_at = ?7
         WHERE id = ?1",
        params![
            id.to_string(),
            definition.name,
            definition.body_region,
            definition.description,
            serde_json::to_string(&definition.questions)?,
            serde_json::to_string(&definition.conditions)?,
            format_timestamp(&now()),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "DiagnosticModule".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn set_module_active(conn: &Connection, id: &Uuid, active: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE diagnostic_modules SET active = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), active as i32, format_timestamp(&now())],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "DiagnosticModule".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn get_module(conn: &Connection, id: &Uuid) -> Result<Option<DiagnosticModule>, DatabaseError> {
    let sql = format!("SELECT {MODULE_COLUMNS} FROM diagnostic_modules WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_module_row)
        .optional()?;
    row.map(module_from_row).transpose()
}

/// All modules, or only active ones. Ordered by body region then name.
pub fn list_modules(conn: &Connection, active_only: bool) -> Result<Vec<DiagnosticModule>, DatabaseError> {
    let sql = if active_only {
        format!("SELECT {MODULE_COLUMNS} FROM diagnostic_modules WHERE active = 1 ORDER BY body_region, name")
    } else {
        format!("SELECT {MODULE_COLUMNS} FROM diagnostic_modules ORDER BY body_region, name")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_module_row)?;
    let mut modules = Vec::new();
    for row in rows {
        modules.push(module_from_row(row?)?);
    }
    Ok(modules)
}

pub fn count_modules(conn: &Connection) -> Result<(u32, u32), DatabaseError> {
    let counts = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(active), 0) FROM diagnostic_modules",
        [],
        |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?)),
    )?;
    Ok(counts)
}

type ModuleRow = (String, String, String, String, i32, String, String, i32, String, String);

fn read_module_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModuleRow> {
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
    ))
}

fn module_from_row(row: ModuleRow) -> Result<DiagnosticModule, DatabaseError> {
    let (id, name, body_region, description, version, questions, conditions, active, created_at, updated_at) = row;
    Ok(DiagnosticModule {
        id: parse_uuid(&id)?,
        name,
        body_region,
        description,
        version,
        questions: serde_json::from_str(&questions)?,
        conditions: serde_json::from_str(&conditions)?,
        active: active != 0,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}
