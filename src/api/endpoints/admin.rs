//! Administrator endpoints. Every handler requires the admin role.
//!
//! - `GET /api/admin/users`: filter by role, status or a search term
//! - `PATCH /api/admin/users/:id`: change status and/or role
//! - `POST /api/admin/users/:id/approve`: activate a pending clinician
//! - `GET|POST /api/admin/modules`, `PUT|DELETE /api/admin/modules/:id`
//! - `POST /api/admin/modules/:id/activate`
//! - `GET /api/admin/audit`: recent API access records

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db::{self, AuditEntry, UserFilter};
use crate::models::enums::{Role, UserStatus};
use crate::models::{DiagnosticModule, ModuleDefinition, ModuleSummary, UserProfile};
use crate::notifications;

const ADMIN: &[Role] = &[Role::Admin];

#[derive(Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
}

/// `GET /api/admin/users`
pub async fn list_users(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    user.require_role(ADMIN)?;
    let filter = UserFilter {
        role: query.role,
        status: query.status,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let users = super::with_db(&ctx, move |_, conn| {
        Ok(db::list_users(conn, &filter)?
            .iter()
            .map(UserProfile::from)
            .collect())
    })
    .await?;
    Ok(Json(users))
}

#[derive(Deserialize)]
pub struct UserUpdate {
    pub status: Option<UserStatus>,
    pub role: Option<Role>,
}

/// `PATCH /api/admin/users/:id`
pub async fn update_user(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    user.require_role(ADMIN)?;
    let id = super::parse_id(&user_id, "user")?;
    if id == user.id() {
        return Err(ApiError::Forbidden(
            "Administrators cannot change their own role or status".into(),
        ));
    }
    if update.status.is_none() && update.role.is_none() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }

    let admin_id = user.id();
    let profile = super::with_db(&ctx, move |_, conn| {
        if db::get_user(conn, &id)?.is_none() {
            return Err(ApiError::NotFound("User not found".into()));
        }
        if let Some(status) = update.status {
            db::update_status(conn, &id, status)?;
        }
        if let Some(role) = update.role {
            db::update_role(conn, &id, role)?;
        }
        let updated = db::get_user(conn, &id)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
        tracing::info!(
            admin_id = %admin_id,
            user_id = %id,
            role = %updated.role,
            status = %updated.status,
            "User account updated"
        );
        Ok(UserProfile::from(&updated))
    })
    .await?;
    Ok(Json(profile))
}

/// `POST /api/admin/users/:id/approve`: pending clinician to active.
pub async fn approve_user(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    user.require_role(ADMIN)?;
    let id = super::parse_id(&user_id, "user")?;
    let admin_id = user.id();

    let profile = super::with_db(&ctx, move |_, conn| {
        let target = db::get_user(conn, &id)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
        if target.role != Role::Clinician {
            return Err(ApiError::BadRequest("Only clinician accounts need approval".into()));
        }
        if target.status != UserStatus::Pending {
            return Err(ApiError::Conflict("Account is not awaiting approval".into()));
        }

        db::update_status(conn, &id, UserStatus::Active)?;
        if let Err(e) = notifications::notify_account_approved(conn, &id) {
            tracing::warn!(user_id = %id, error = %e, "Approval notification not stored");
        }
        tracing::info!(admin_id = %admin_id, user_id = %id, "Clinician approved");

        let approved = db::get_user(conn, &id)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
        Ok(UserProfile::from(&approved))
    })
    .await?;
    Ok(Json(profile))
}

/// `GET /api/admin/modules`: active and inactive.
pub async fn list_modules(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ModuleSummary>>, ApiError> {
    user.require_role(ADMIN)?;
    let modules = super::with_db(&ctx, |_, conn| {
        Ok(db::list_modules(conn, false)?
            .iter()
            .map(DiagnosticModule::summary)
            .collect())
    })
    .await?;
    Ok(Json(modules))
}

fn validated(definition: ModuleDefinition) -> Result<ModuleDefinition, ApiError> {
    definition
        .validate()
        .map_err(|reason| ApiError::BadRequest(format!("Invalid module: {reason}")))?;
    Ok(definition)
}

/// `POST /api/admin/modules`
pub async fn create_module(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Json(definition): Json<ModuleDefinition>,
) -> Result<(StatusCode, Json<DiagnosticModule>), ApiError> {
    user.require_role(ADMIN)?;
    let definition = validated(definition)?;
    let module = super::with_db(&ctx, move |_, conn| {
        let module = DiagnosticModule::from_definition(definition);
        db::insert_module(conn, &module)?;
        tracing::info!(module_id = %module.id, region = %module.body_region, "Diagnostic module created");
        Ok(module)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(module)))
}

fn fetch_module(conn: &rusqlite::Connection, id: &Uuid) -> Result<DiagnosticModule, ApiError> {
    db::get_module(conn, id)?.ok_or_else(|| ApiError::NotFound("Diagnostic module not found".into()))
}

/// `PUT /api/admin/modules/:id`: replace the definition, bumping the version.
pub async fn update_module(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
    Json(definition): Json<ModuleDefinition>,
) -> Result<Json<DiagnosticModule>, ApiError> {
    user.require_role(ADMIN)?;
    let id = super::parse_id(&module_id, "module")?;
    let definition = validated(definition)?;
    let module = super::with_db(&ctx, move |_, conn| {
        db::update_module_definition(conn, &id, &definition)?;
        let module = fetch_module(conn, &id)?;
        tracing::info!(module_id = %id, version = module.version, "Diagnostic module updated");
        Ok(module)
    })
    .await?;
    Ok(Json(module))
}

/// `DELETE /api/admin/modules/:id`: deactivate. Past assessments keep
/// pointing at the module, so rows are never removed.
pub async fn deactivate_module(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    user.require_role(ADMIN)?;
    let id = super::parse_id(&module_id, "module")?;
    super::with_db(&ctx, move |_, conn| {
        db::set_module_active(conn, &id, false)?;
        tracing::info!(module_id = %id, "Diagnostic module deactivated");
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/admin/modules/:id/activate`
pub async fn activate_module(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
) -> Result<Json<DiagnosticModule>, ApiError> {
    user.require_role(ADMIN)?;
    let id = super::parse_id(&module_id, "module")?;
    let module = super::with_db(&ctx, move |_, conn| {
        db::set_module_active(conn, &id, true)?;
        fetch_module(conn, &id)
    })
    .await?;
    Ok(Json(module))
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<Uuid>,
    pub limit: Option<u32>,
}

/// `GET /api/admin/audit`: newest first. Buffered entries are flushed
/// before the query so the caller's own recent requests show up.
pub async fn audit_log(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    user.require_role(ADMIN)?;
    let limit = super::page_limit(query.limit, 100, 1000);
    let entries = super::with_db(&ctx, move |core, conn| {
        core.flush_and_prune_audit()?;
        let user_id = query.user_id.map(|id| id.to_string());
        Ok(db::query_recent_audit(conn, user_id.as_deref(), limit)?)
    })
    .await?;
    Ok(Json(entries))
}
