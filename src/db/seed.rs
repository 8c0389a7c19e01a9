//! First-run data: built-in diagnostic modules and the bootstrap admin.

use rusqlite::Connection;
use uuid::Uuid;

use super::DatabaseError;
use crate::config::mask_email;
use crate::models::enums::{Role, UserStatus};
use crate::models::{DiagnosticModule, ModuleDefinition, User};

const BUILTIN_MODULES: &[(&str, &str)] = &[
    ("head", include_str!("../../resources/modules/head.json")),
    ("chest", include_str!("../../resources/modules/chest.json")),
    ("abdomen", include_str!("../../resources/modules/abdomen.json")),
];

pub fn builtin_module_definitions() -> Result<Vec<ModuleDefinition>, DatabaseError> {
    BUILTIN_MODULES
        .iter()
        .map(|(_, json)| serde_json::from_str(json).map_err(DatabaseError::from))
        .collect()
}

impl DiagnosticModule {
    /// New active module at version 1.
    pub fn from_definition(definition: ModuleDefinition) -> Self {
        let ts = super::now();
        Self {
            id: Uuid::new_v4(),
            name: definition.name,
            body_region: definition.body_region,
            description: definition.description,
            version: 1,
            questions: definition.questions,
            conditions: definition.conditions,
            active: true,
            created_at: ts,
            updated_at: ts,
        }
    }
}

/// Install the built-in modules when the modules table is empty.
/// Returns how many were inserted.
pub fn seed_default_modules(conn: &Connection) -> Result<usize, DatabaseError> {
    let (total, _) = super::count_modules(conn)?;
    if total > 0 {
        return Ok(0);
    }

    let definitions = builtin_module_definitions()?;
    let tx = conn.unchecked_transaction()?;
    for definition in &definitions {
        super::insert_module(&tx, &DiagnosticModule::from_definition(definition.clone()))?;
    }
    tx.commit()?;

    tracing::info!(count = definitions.len(), "Seeded built-in diagnostic modules");
    Ok(definitions.len())
}

/// Create the configured admin account when no admin exists.
/// `password_hash` is only computed when an account is actually created.
pub fn ensure_admin<F>(
    conn: &Connection,
    email: &str,
    name: &str,
    password_hash: F,
) -> Result<bool, DatabaseError>
where
    F: FnOnce() -> String,
{
    if super::admin_exists(conn)? {
        return Ok(false);
    }
    let email = email.trim().to_lowercase();
    if let Some(existing) = super::get_user_by_email(conn, &email)? {
        // Promote an existing account rather than colliding on the email
        super::update_role(conn, &existing.id, Role::Admin)?;
        super::update_status(conn, &existing.id, UserStatus::Active)?;
        tracing::warn!(email = %mask_email(&email), "Promoted existing account to admin");
        return Ok(true);
    }

    let ts = super::now();
    let admin = User {
        id: Uuid::new_v4(),
        email: email.clone(),
        name: name.to_string(),
        password_hash: password_hash(),
        role: Role::Admin,
        status: UserStatus::Active,
        email_verified: true,
        phone: None,
        date_of_birth: None,
        gender: None,
        specialty: None,
        license_number: None,
        avatar_url: None,
        created_at: ts,
        updated_at: ts,
    };
    super::insert_user(conn, &admin)?;
    tracing::info!(email = %mask_email(&email), "Created bootstrap admin account");
    Ok(true)
}
