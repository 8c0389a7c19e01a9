//! Diagnostic module endpoints (questionnaires).
//!
//! - `GET /api/modules`: active modules; staff may include inactive ones
//! - `GET /api/modules/:id`: full questionnaire

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db;
use crate::models::{DiagnosticModule, ModuleSummary};

#[derive(Deserialize)]
pub struct ModuleListQuery {
    pub include_inactive: Option<bool>,
}

/// `GET /api/modules`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ModuleListQuery>,
) -> Result<Json<Vec<ModuleSummary>>, ApiError> {
    let active_only = !(user.actor().is_staff() && query.include_inactive.unwrap_or(false));
    let modules = super::with_db(&ctx, move |_, conn| {
        Ok(db::list_modules(conn, active_only)?
            .iter()
            .map(DiagnosticModule::summary)
            .collect())
    })
    .await?;
    Ok(Json(modules))
}

/// `GET /api/modules/:id`: inactive modules are hidden from patients.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
) -> Result<Json<DiagnosticModule>, ApiError> {
    let id = super::parse_id(&module_id, "module")?;
    let staff = user.actor().is_staff();
    let module = super::with_db(&ctx, move |_, conn| {
        db::get_module(conn, &id)?
            .filter(|m| m.active || staff)
            .ok_or_else(|| ApiError::NotFound("Diagnostic module not found".into()))
    })
    .await?;
    Ok(Json(module))
}
