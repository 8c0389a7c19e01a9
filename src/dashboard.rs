//! Role-specific dashboard page data.
//!
//! One aggregate per portal: the patient home, the clinician work queue and
//! the admin overview. All functions read the service database via rusqlite.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::{self, AssessmentFilter, DatabaseError, UserFilter};
use crate::models::enums::{AssessmentStatus, Role, RiskLevel, UserStatus};
use crate::models::{AssessmentSummary, ModuleSummary, User, UserProfile};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

const RECENT_ASSESSMENTS: u32 = 5;
const QUEUE_LENGTH: u32 = 20;
const SUBMISSION_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: AssessmentStatus,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskCount {
    pub risk_level: RiskLevel,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCount {
    pub role: Role,
    pub status: UserStatus,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    /// `YYYY-MM-DD`, UTC.
    pub date: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard {
    pub profile: UserProfile,
    pub assessments_by_status: Vec<StatusCount>,
    pub recent_assessments: Vec<AssessmentSummary>,
    pub unread_notifications: u32,
    pub modules: Vec<ModuleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClinicianDashboard {
    pub profile: UserProfile,
    pub review_queue: Vec<AssessmentSummary>,
    pub in_review: Vec<AssessmentSummary>,
    pub reviewed_by_me: u32,
    pub high_risk_pending: u32,
    pub unread_notifications: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub profile: UserProfile,
    pub users: Vec<UserCount>,
    pub pending_clinicians: Vec<UserProfile>,
    pub assessments_by_status: Vec<StatusCount>,
    pub assessments_by_risk: Vec<RiskCount>,
    pub submissions_last_7_days: Vec<DailyCount>,
    pub modules_total: u32,
    pub modules_active: u32,
    pub unread_notifications: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Dashboard {
    Patient(PatientDashboard),
    Clinician(ClinicianDashboard),
    Admin(AdminDashboard),
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Page data for `user`'s portal.
pub fn dashboard_for(conn: &Connection, user: &User) -> Result<Dashboard, DatabaseError> {
    Ok(match user.role {
        Role::Patient => Dashboard::Patient(patient_dashboard(conn, user)?),
        Role::Clinician => Dashboard::Clinician(clinician_dashboard(conn, user)?),
        Role::Admin => Dashboard::Admin(admin_dashboard(conn, user)?),
    })
}

fn status_counts(conn: &Connection, patient: Option<&uuid::Uuid>) -> Result<Vec<StatusCount>, DatabaseError> {
    Ok(db::count_by_status(conn, patient)?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect())
}

pub fn patient_dashboard(conn: &Connection, user: &User) -> Result<PatientDashboard, DatabaseError> {
    let recent = db::list_assessment_summaries(
        conn,
        &AssessmentFilter {
            patient_id: Some(user.id),
            limit: Some(RECENT_ASSESSMENTS),
            ..Default::default()
        },
    )?;
    let modules = db::list_modules(conn, true)?
        .iter()
        .map(|m| m.summary())
        .collect();

    Ok(PatientDashboard {
        profile: UserProfile::from(user),
        assessments_by_status: status_counts(conn, Some(&user.id))?,
        recent_assessments: recent,
        unread_notifications: db::count_unread(conn, &user.id)?,
        modules,
    })
}

pub fn clinician_dashboard(conn: &Connection, user: &User) -> Result<ClinicianDashboard, DatabaseError> {
    let in_review = db::list_assessment_summaries(
        conn,
        &AssessmentFilter {
            clinician_id: Some(user.id),
            status: Some(AssessmentStatus::InReview),
            ..Default::default()
        },
    )?;

    Ok(ClinicianDashboard {
        profile: UserProfile::from(user),
        review_queue: db::review_queue(conn, QUEUE_LENGTH)?,
        in_review,
        reviewed_by_me: db::count_reviewed_by(conn, &user.id)?,
        high_risk_pending: db::count_pending_elevated(conn)?,
        unread_notifications: db::count_unread(conn, &user.id)?,
    })
}

pub fn admin_dashboard(conn: &Connection, user: &User) -> Result<AdminDashboard, DatabaseError> {
    let users = db::count_users_by_role_status(conn)?
        .into_iter()
        .map(|(role, status, count)| UserCount { role, status, count })
        .collect();
    let pending_clinicians = db::list_users(
        conn,
        &UserFilter {
            role: Some(Role::Clinician),
            status: Some(UserStatus::Pending),
            search: None,
        },
    )?
    .iter()
    .map(UserProfile::from)
    .collect();
    let assessments_by_risk = db::count_by_risk(conn)?
        .into_iter()
        .map(|(risk_level, count)| RiskCount { risk_level, count })
        .collect();
    let submissions = db::submissions_per_day(conn, SUBMISSION_WINDOW_DAYS)?
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect();
    let (modules_total, modules_active) = db::count_modules(conn)?;

    Ok(AdminDashboard {
        profile: UserProfile::from(user),
        users,
        pending_clinicians,
        assessments_by_status: status_counts(conn, None)?,
        assessments_by_risk,
        submissions_last_7_days: submissions,
        modules_total,
        modules_active,
        unread_notifications: db::count_unread(conn, &user.id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::rule_based_analysis;
    use crate::db::open_memory_database;
    use crate::models::{Answer, DiagnosisSession};
    use crate::test_support::*;

    fn insert_session(
        conn: &Connection,
        patient: &User,
        module: &crate::models::DiagnosticModule,
        location: &str,
    ) -> DiagnosisSession {
        let responses = responses(vec![
            ("location", Answer::Choice(location.into())),
            ("severity", Answer::Scale(6)),
        ]);
        let analysis = rule_based_analysis(module, &responses);
        let ts = db::now();
        let session = DiagnosisSession {
            id: uuid::Uuid::new_v4(),
            patient_id: patient.id,
            module_id: module.id,
            body_region: module.body_region.clone(),
            responses,
            provisional_diagnosis: analysis.provisional_diagnosis.clone(),
            confidence: analysis.confidence,
            risk_level: analysis.risk_level,
            analysis,
            status: AssessmentStatus::PendingReview,
            clinician_id: None,
            clinician_notes: None,
            final_diagnosis: None,
            attachments: vec![],
            created_at: ts,
            updated_at: ts,
            reviewed_at: None,
        };
        db::insert_assessment(conn, &session).unwrap();
        session
    }

    #[test]
    fn patient_dashboard_shows_own_history_and_modules() {
        let conn = open_memory_database().unwrap();
        let module = insert_module_fixture(&conn);
        let me = insert_user_fixture(&conn, "me@example.com", Role::Patient, UserStatus::Active);
        let other = insert_user_fixture(&conn, "other@example.com", Role::Patient, UserStatus::Active);
        insert_session(&conn, &me, &module, "one_side");
        insert_session(&conn, &other, &module, "band");

        let Dashboard::Patient(page) = dashboard_for(&conn, &me).unwrap() else {
            panic!("expected patient dashboard");
        };
        assert_eq!(page.recent_assessments.len(), 1);
        assert_eq!(page.assessments_by_status.len(), 1);
        assert_eq!(page.assessments_by_status[0].count, 1);
        assert_eq!(page.modules.len(), 1);
        assert_eq!(page.profile.email, "me@example.com");
    }

    #[test]
    fn clinician_dashboard_lists_queue_and_claims() {
        let conn = open_memory_database().unwrap();
        let module = insert_module_fixture(&conn);
        let patient = insert_user_fixture(&conn, "p@example.com", Role::Patient, UserStatus::Active);
        let doc = insert_user_fixture(&conn, "doc@example.com", Role::Clinician, UserStatus::Active);
        let claimed = insert_session(&conn, &patient, &module, "one_side");
        insert_session(&conn, &patient, &module, "band");
        db::claim_assessment(&conn, &claimed.id, &doc.id).unwrap();

        let Dashboard::Clinician(page) = dashboard_for(&conn, &doc).unwrap() else {
            panic!("expected clinician dashboard");
        };
        assert_eq!(page.review_queue.len(), 1);
        assert_eq!(page.in_review.len(), 1);
        assert_eq!(page.in_review[0].id, claimed.id);
        assert_eq!(page.reviewed_by_me, 0);
    }

    #[test]
    fn admin_dashboard_counts_users_and_pending_clinicians() {
        let conn = open_memory_database().unwrap();
        let module = insert_module_fixture(&conn);
        let admin = insert_user_fixture(&conn, "admin@example.com", Role::Admin, UserStatus::Active);
        let patient = insert_user_fixture(&conn, "p@example.com", Role::Patient, UserStatus::Active);
        insert_user_fixture(&conn, "new-doc@example.com", Role::Clinician, UserStatus::Pending);
        insert_session(&conn, &patient, &module, "one_side");

        let Dashboard::Admin(page) = dashboard_for(&conn, &admin).unwrap() else {
            panic!("expected admin dashboard");
        };
        assert_eq!(page.users.len(), 3);
        assert_eq!(page.pending_clinicians.len(), 1);
        assert_eq!(page.modules_total, 1);
        assert_eq!(page.modules_active, 1);
        assert_eq!(page.submissions_last_7_days.iter().map(|d| d.count).sum::<u32>(), 1);
        assert_eq!(page.assessments_by_risk.iter().map(|r| r.count).sum::<u32>(), 1);
    }

    #[test]
    fn dashboard_serializes_with_role_tag() {
        let conn = open_memory_database().unwrap();
        let me = insert_user_fixture(&conn, "me@example.com", Role::Patient, UserStatus::Active);
        let json = serde_json::to_value(dashboard_for(&conn, &me).unwrap()).unwrap();
        assert_eq!(json["role"], "patient");
        assert!(json["recent_assessments"].as_array().unwrap().is_empty());
    }
}
