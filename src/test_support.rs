//! Shared fixtures for unit tests across modules.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::Connection;
use tempfile::TempDir;
use uuid::Uuid;

use crate::analysis::LlmClient;
use crate::config::ServerConfig;
use crate::core_state::CoreState;
use crate::db;
use crate::mail::MemoryMailer;
use crate::media::MemoryMediaStore;
use crate::models::enums::*;
use crate::models::*;

/// Low PBKDF2 work factor so tests stay fast; production uses the config default.
pub const TEST_PASSWORD_ITERATIONS: u32 = 1_000;

pub fn user_fixture(email: &str, role: Role, status: UserStatus) -> User {
    let ts = db::now();
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: format!("User {email}"),
        password_hash: "pbkdf2-sha256$1$c2FsdA$aGFzaA".to_string(),
        role,
        status,
        email_verified: false,
        phone: None,
        date_of_birth: None,
        gender: None,
        specialty: None,
        license_number: None,
        avatar_url: None,
        created_at: ts,
        updated_at: ts,
    }
}

pub fn insert_user_fixture(conn: &Connection, email: &str, role: Role, status: UserStatus) -> User {
    let user = user_fixture(email, role, status);
    db::insert_user(conn, &user).unwrap();
    user
}

fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn option(value: &str, label: &str, pairs: &[(&str, f64)], red_flag: bool) -> AnswerOption {
    AnswerOption {
        value: value.to_string(),
        label: label.to_string(),
        scores: scores(pairs),
        red_flag,
    }
}

/// Small three-question head module used across analysis and API tests.
///
/// Conditions: `migraine` (moderate), `tension` (low), `meningitis` (critical).
pub fn module_fixture() -> DiagnosticModule {
    let ts = db::now();
    DiagnosticModule {
        id: Uuid::new_v4(),
        name: "Headache".to_string(),
        body_region: "head".to_string(),
        description: "Headache triage".to_string(),
        version: 1,
        questions: vec![
            Question {
                id: "location".to_string(),
                prompt: "Where is the pain?".to_string(),
                kind: QuestionKind::SingleChoice,
                weight: 2.0,
                required: true,
                options: vec![
                    option("one_side", "One side", &[("migraine", 1.0), ("tension", 0.1)], false),
                    option("band", "Band around the head", &[("tension", 1.0)], false),
                    option("whole", "Whole head", &[("meningitis", 0.6), ("tension", 0.3)], false),
                ],
                scale_scores: BTreeMap::new(),
                red_flag_at: None,
            },
            Question {
                id: "features".to_string(),
                prompt: "Which apply?".to_string(),
                kind: QuestionKind::MultiChoice,
                weight: 1.0,
                required: false,
                options: vec![
                    option("nausea", "Nausea", &[("migraine", 0.6)], false),
                    option("light", "Light sensitivity", &[("migraine", 0.5), ("meningitis", 0.3)], false),
                    option("stiff_neck", "Stiff neck with fever", &[("meningitis", 1.0)], true),
                ],
                scale_scores: BTreeMap::new(),
                red_flag_at: None,
            },
            Question {
                id: "severity".to_string(),
                prompt: "How severe is the pain?".to_string(),
                kind: QuestionKind::Scale,
                weight: 1.0,
                required: true,
                options: vec![],
                scale_scores: scores(&[("migraine", 0.8), ("meningitis", 0.6), ("tension", 0.2)]),
                red_flag_at: Some(10),
            },
        ],
        conditions: vec![
            ConditionRule {
                id: "migraine".to_string(),
                name: "Migraine".to_string(),
                icd_code: Some("G43".to_string()),
                severity: RiskLevel::Moderate,
                advice: "Rest in a dark room".to_string(),
            },
            ConditionRule {
                id: "tension".to_string(),
                name: "Tension-type headache".to_string(),
                icd_code: Some("G44.2".to_string()),
                severity: RiskLevel::Low,
                advice: "Hydration and rest".to_string(),
            },
            ConditionRule {
                id: "meningitis".to_string(),
                name: "Meningitis".to_string(),
                icd_code: Some("G03".to_string()),
                severity: RiskLevel::Critical,
                advice: "Seek emergency care".to_string(),
            },
        ],
        active: true,
        created_at: ts,
        updated_at: ts,
    }
}

pub fn insert_module_fixture(conn: &Connection) -> DiagnosticModule {
    let module = module_fixture();
    db::insert_module(conn, &module).unwrap();
    module
}

pub fn responses(pairs: Vec<(&str, Answer)>) -> Vec<SymptomResponse> {
    pairs
        .into_iter()
        .map(|(q, answer)| SymptomResponse {
            question_id: q.to_string(),
            answer,
        })
        .collect()
}

/// A `CoreState` on a temporary data directory with in-memory integrations.
pub struct TestHarness {
    pub core: Arc<CoreState>,
    pub mailer: Arc<MemoryMailer>,
    pub media: Arc<MemoryMediaStore>,
    pub dir: TempDir,
}

pub fn test_harness(llm: Option<Arc<dyn LlmClient>>) -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::for_data_dir(dir.path());
    config.password_iterations = TEST_PASSWORD_ITERATIONS;
    config.session_secret = Some("test-session-secret".to_string());
    config.ai.enabled = false;

    let mailer = Arc::new(MemoryMailer::new());
    let media = Arc::new(MemoryMediaStore::new());
    let core = CoreState::new(config)
        .unwrap()
        .with_mailer(mailer.clone())
        .with_media_store(Some(media.clone()))
        .with_llm(llm);
    TestHarness {
        core: Arc::new(core),
        mailer,
        media,
        dir,
    }
}

pub fn test_core() -> (Arc<CoreState>, TempDir) {
    let harness = test_harness(None);
    (harness.core, harness.dir)
}
