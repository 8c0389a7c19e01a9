//! Notification fan-out for assessment and account events.

use std::collections::BTreeSet;

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::{AssessmentStatus, NotificationKind, RiskLevel, Role};
use crate::models::{DiagnosisSession, Notification};

fn assessment_link(id: &Uuid) -> Option<String> {
    Some(format!("/assessments/{id}"))
}

/// Notify every active clinician of a new submission, plus admins when the
/// risk is critical. All rows are inserted in one transaction. Returns the
/// number of recipients.
pub fn notify_submission(
    conn: &Connection,
    session: &DiagnosisSession,
    patient_name: &str,
) -> Result<usize, DatabaseError> {
    let mut recipients: BTreeSet<Uuid> = db::list_active_user_ids_by_role(conn, Role::Clinician)?
        .into_iter()
        .collect();
    if session.risk_level == RiskLevel::Critical {
        recipients.extend(db::list_active_user_ids_by_role(conn, Role::Admin)?);
    }

    let (kind, title) = if session.risk_level.is_elevated() {
        (
            NotificationKind::HighRiskAlert,
            format!("{} risk assessment awaiting review", capitalize(session.risk_level.as_str())),
        )
    } else {
        (NotificationKind::AssessmentSubmitted, "New assessment awaiting review".to_string())
    };
    let message = format!(
        "{patient_name} submitted a {} assessment. Provisional diagnosis: {} ({}% confidence).",
        session.body_region, session.provisional_diagnosis, session.confidence
    );

    let batch: Vec<Notification> = recipients
        .into_iter()
        .map(|user_id| {
            Notification::new(user_id, kind, title.clone(), message.clone(), assessment_link(&session.id))
        })
        .collect();
    db::insert_notifications(conn, &batch)?;

    tracing::info!(
        assessment_id = %session.id,
        risk = %session.risk_level,
        recipients = batch.len(),
        "Submission notifications sent"
    );
    Ok(batch.len())
}

pub fn notify_claimed(conn: &Connection, session: &DiagnosisSession, clinician_name: &str) -> Result<(), DatabaseError> {
    let n = Notification::new(
        session.patient_id,
        NotificationKind::AssessmentClaimed,
        "Your assessment is being reviewed",
        format!("{clinician_name} has started reviewing your {} assessment.", session.body_region),
        assessment_link(&session.id),
    );
    db::insert_notifications(conn, &[n])
}

pub fn notify_reviewed(conn: &Connection, session: &DiagnosisSession) -> Result<(), DatabaseError> {
    let final_diagnosis = session.final_diagnosis.as_deref().unwrap_or("see details");
    let message = match session.status {
        AssessmentStatus::FollowUp => format!(
            "Your {} assessment was reviewed ({final_diagnosis}). A follow-up is required.",
            session.body_region
        ),
        _ => format!(
            "Your {} assessment was reviewed. Diagnosis: {final_diagnosis}.",
            session.body_region
        ),
    };
    let n = Notification::new(
        session.patient_id,
        NotificationKind::AssessmentReviewed,
        "Your assessment has been reviewed",
        message,
        assessment_link(&session.id),
    );
    db::insert_notifications(conn, &[n])
}

pub fn notify_account_approved(conn: &Connection, user_id: &Uuid) -> Result<(), DatabaseError> {
    let n = Notification::new(
        *user_id,
        NotificationKind::AccountApproved,
        "Your clinician account is approved",
        "You can now sign in and start reviewing assessments.",
        Some("/dashboard".to_string()),
    );
    db::insert_notifications(conn, &[n])
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
