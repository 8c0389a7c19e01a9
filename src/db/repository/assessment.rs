use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{format_timestamp, now, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const RISK_RANK_SQL: &str =
    "CASE a.risk_level WHEN 'critical' THEN 3 WHEN 'high' THEN 2 WHEN 'moderate' THEN 1 ELSE 0 END";

const SUMMARY_SELECT: &str = "SELECT a.id, a.patient_id, u.name, m.name, a.body_region,
     a.provisional_diagnosis, a.confidence, a.risk_level, a.status, a.clinician_id,
     a.final_diagnosis, a.created_at
     FROM assessments a
     JOIN users u ON u.id = a.patient_id
     JOIN diagnostic_modules m ON m.id = a.module_id";

/// Listing filter. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct AssessmentFilter {
    pub patient_id: Option<Uuid>,
    pub clinician_id: Option<Uuid>,
    pub status: Option<AssessmentStatus>,
    pub risk_level: Option<RiskLevel>,
    pub limit: Option<u32>,
}

/// Per-patient roll-up for the clinician patient list.
#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub patient_id: Uuid,
    pub name: String,
    pub email: String,
    pub assessment_count: u32,
    pub open_count: u32,
    pub latest_risk: Option<RiskLevel>,
    pub latest_assessment_at: Option<String>,
}

pub fn insert_assessment(conn: &Connection, session: &DiagnosisSession) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO assessments (id, patient_id, module_id, body_region, responses, analysis,
         provisional_diagnosis, confidence, risk_level, status, clinician_id, clinician_notes,
         final_diagnosis, attachments, created_at, updated_at, reviewed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            session.id.to_string(),
            session.patient_id.to_string(),
            session.module_id.to_string(),
            session.body_region,
            serde_json::to_string(&session.responses)?,
            serde_json::to_string(&session.analysis)?,
            session.provisional_diagnosis,
            session.confidence,
            session.risk_level.as_str(),
            session.status.as_str(),
            session.clinician_id.map(|id| id.to_string()),
            session.clinician_notes,
            session.final_diagnosis,
            serde_json::to_string(&session.attachments)?,
            format_timestamp(&session.created_at),
            format_timestamp(&session.updated_at),
            session.reviewed_at.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

pub fn get_assessment(conn: &Connection, id: &Uuid) -> Result<Option<DiagnosisSession>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, module_id, body_region, responses, analysis,
             provisional_diagnosis, confidence, risk_level, status, clinician_id, clinician_notes,
             final_diagnosis, attachments, created_at, updated_at, reviewed_at
             FROM assessments WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    (
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, u8>(7)?,
                        row.get::<_, String>(8)?,
                    ),
                    (
                        row.get::<_, String>(9)?,
                        row.get::<_, Option<String>>(10)?,
                        row.get::<_, Option<String>>(11)?,
                        row.get::<_, Option<String>>(12)?,
                        row.get::<_, String>(13)?,
                        row.get::<_, String>(14)?,
                        row.get::<_, String>(15)?,
                        row.get::<_, Option<String>>(16)?,
                    ),
                ))
            },
        )
        .optional()?;

    let Some((head, tail)) = row else {
        return Ok(None);
    };
    let (id, patient_id, module_id, body_region, responses, analysis, provisional, confidence, risk) = head;
    let (status, clinician_id, notes, final_dx, attachments, created_at, updated_at, reviewed_at) = tail;

    Ok(Some(DiagnosisSession {
        id: parse_uuid(&id)?,
        patient_id: parse_uuid(&patient_id)?,
        module_id: parse_uuid(&module_id)?,
        body_region,
        responses: serde_json::from_str(&responses)?,
        analysis: serde_json::from_str(&analysis)?,
        provisional_diagnosis: provisional,
        confidence,
        risk_level: RiskLevel::from_str(&risk)?,
        status: AssessmentStatus::from_str(&status)?,
        clinician_id: clinician_id.map(|s| parse_uuid(&s)).transpose()?,
        clinician_notes: notes,
        final_diagnosis: final_dx,
        attachments: serde_json::from_str(&attachments)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        reviewed_at: reviewed_at.map(|s| parse_timestamp(&s)),
    }))
}

/// Filtered history, newest first.
pub fn list_assessment_summaries(
    conn: &Connection,
    filter: &AssessmentFilter,
) -> Result<Vec<AssessmentSummary>, DatabaseError> {
    let mut sql = format!("{SUMMARY_SELECT} WHERE 1=1");
    let mut values: Vec<String> = Vec::new();

    if let Some(patient_id) = filter.patient_id {
        values.push(patient_id.to_string());
        sql.push_str(&format!(" AND a.patient_id = ?{}", values.len()));
    }
    if let Some(clinician_id) = filter.clinician_id {
        values.push(clinician_id.to_string());
        sql.push_str(&format!(" AND a.clinician_id = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(status.as_str().to_string());
        sql.push_str(&format!(" AND a.status = ?{}", values.len()));
    }
    if let Some(risk) = filter.risk_level {
        values.push(risk.as_str().to_string());
        sql.push_str(&format!(" AND a.risk_level = ?{}", values.len()));
    }
    sql.push_str(" ORDER BY a.created_at DESC, a.id");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    query_summaries(conn, &sql, rusqlite::params_from_iter(values.iter()))
}

/// Pending assessments, most urgent first, then oldest first.
pub fn review_queue(conn: &Connection, limit: u32) -> Result<Vec<AssessmentSummary>, DatabaseError> {
    let sql = format!(
        "{SUMMARY_SELECT} WHERE a.status = 'pending_review'
         ORDER BY {RISK_RANK_SQL} DESC, a.created_at ASC LIMIT ?1"
    );
    query_summaries(conn, &sql, params![limit])
}

fn query_summaries<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<AssessmentSummary>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, u8>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, Option<String>>(9)?,
            row.get::<_, Option<String>>(10)?,
            row.get::<_, String>(11)?,
        ))
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        let (id, patient_id, patient_name, module_name, body_region, provisional, confidence, risk, status, clinician, final_dx, created_at) = row?;
        summaries.push(AssessmentSummary {
            id: parse_uuid(&id)?,
            patient_id: parse_uuid(&patient_id)?,
            patient_name,
            module_name,
            body_region,
            provisional_diagnosis: provisional,
            confidence,
            risk_level: RiskLevel::from_str(&risk)?,
            status: AssessmentStatus::from_str(&status)?,
            clinician_id: clinician.map(|s| parse_uuid(&s)).transpose()?,
            final_diagnosis: final_dx,
            created_at: parse_timestamp(&created_at),
        });
    }
    Ok(summaries)
}

/// Atomically move `pending_review → in_review`. Returns false if the
/// assessment was no longer pending.
pub fn claim_assessment(conn: &Connection, id: &Uuid, clinician_id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE assessments SET status = 'in_review', clinician_id = ?2, updated_at = ?3
         WHERE id = ?1 AND status = 'pending_review'",
        params![id.to_string(), clinician_id.to_string(), format_timestamp(&now())],
    )?;
    Ok(changed == 1)
}

/// Atomically record a review. Only succeeds while the assessment is
/// reviewable and unclaimed or claimed by `clinician_id`.
pub fn record_review(
    conn: &Connection,
    id: &Uuid,
    clinician_id: &Uuid,
    final_diagnosis: &str,
    notes: Option<&str>,
    status: AssessmentStatus,
) -> Result<bool, DatabaseError> {
    let ts = format_timestamp(&now());
    let changed = conn.execute(
        "UPDATE assessments SET status = ?3, clinician_id = ?2, final_diagnosis = ?4,
         clinician_notes = ?5, reviewed_at = ?6, updated_at = ?6
         WHERE id = ?1
           AND status IN ('pending_review', 'in_review', 'follow_up')
           AND (clinician_id IS NULL OR clinician_id = ?2)",
        params![id.to_string(), clinician_id.to_string(), status.as_str(), final_diagnosis, notes, ts],
    )?;
    Ok(changed == 1)
}

pub fn count_by_status(
    conn: &Connection,
    patient_id: Option<&Uuid>,
) -> Result<Vec<(AssessmentStatus, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM assessments
         WHERE (?1 IS NULL OR patient_id = ?1)
         GROUP BY status ORDER BY status",
    )?;
    let rows = stmt
        .query_map(params![patient_id.map(|id| id.to_string())], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(status, n)| Ok((AssessmentStatus::from_str(&status)?, n)))
        .collect()
}

pub fn count_by_risk(conn: &Connection) -> Result<Vec<(RiskLevel, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT risk_level, COUNT(*) FROM assessments GROUP BY risk_level ORDER BY risk_level",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(risk, n)| Ok((RiskLevel::from_str(&risk)?, n)))
        .collect()
}

pub fn count_pending_elevated(conn: &Connection) -> Result<u32, DatabaseError> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM assessments
         WHERE status = 'pending_review' AND risk_level IN ('high', 'critical')",
        [],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub fn count_reviewed_by(conn: &Connection, clinician_id: &Uuid) -> Result<u32, DatabaseError> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM assessments
         WHERE clinician_id = ?1 AND status IN ('reviewed', 'follow_up')",
        params![clinician_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Submissions per UTC day over the last `days` days, oldest first.
/// Days without submissions are omitted.
pub fn submissions_per_day(conn: &Connection, days: u32) -> Result<Vec<(String, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT substr(created_at, 1, 10) AS day, COUNT(*) FROM assessments
         WHERE created_at >= datetime('now', ?1)
         GROUP BY day ORDER BY day",
    )?;
    let rows = stmt
        .query_map(params![format!("-{days} days")], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Patients with their assessment roll-ups, most recently active first.
pub fn patient_summaries(conn: &Connection) -> Result<Vec<PatientSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.email,
            COUNT(a.id),
            COALESCE(SUM(CASE WHEN a.status IN ('pending_review', 'in_review', 'follow_up') THEN 1 ELSE 0 END), 0),
            (SELECT risk_level FROM assessments l WHERE l.patient_id = u.id ORDER BY l.created_at DESC LIMIT 1),
            MAX(a.created_at)
         FROM users u
         LEFT JOIN assessments a ON a.patient_id = u.id
         WHERE u.role = 'patient'
         GROUP BY u.id
         ORDER BY MAX(a.created_at) IS NULL, MAX(a.created_at) DESC, u.name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, name, email, total, open, latest_risk, latest_at)| {
            Ok(PatientSummary {
                patient_id: parse_uuid(&id)?,
                name,
                email,
                assessment_count: total,
                open_count: open,
                latest_risk: latest_risk.map(|r| RiskLevel::from_str(&r)).transpose()?,
                latest_assessment_at: latest_at,
            })
        })
        .collect()
}
