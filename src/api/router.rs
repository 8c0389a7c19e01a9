//! HTTP API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. CORS (when configured) → 2. Rate limiter → 3. Auth validator → 4. Audit logger

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);
    build_router(ctx)
}

fn cors_layer(origin: Option<&str>) -> Option<CorsLayer> {
    let origin = origin?;
    match HeaderValue::from_str(origin) {
        Ok(value) => Some(
            CorsLayer::new()
                .allow_origin(value)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        ),
        Err(_) => {
            tracing::warn!(origin, "Ignoring invalid CORS origin");
            None
        }
    }
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Rate limit → Auth → Audit (innermost) → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/session", get(endpoints::auth::session))
        .route(
            "/profile",
            get(endpoints::profile::get).put(endpoints::profile::update),
        )
        .route("/profile/password", post(endpoints::profile::change_password))
        .route("/modules", get(endpoints::modules::list))
        .route("/modules/:id", get(endpoints::modules::detail))
        .route(
            "/assessments",
            post(endpoints::assessments::submit).get(endpoints::assessments::list),
        )
        .route("/assessments/:id", get(endpoints::assessments::detail))
        .route("/assessments/:id/claim", post(endpoints::assessments::claim))
        .route("/assessments/:id/review", post(endpoints::assessments::review))
        .route("/notifications", get(endpoints::notifications::list))
        .route(
            "/notifications/unread-count",
            get(endpoints::notifications::unread_count),
        )
        .route(
            "/notifications/read-all",
            post(endpoints::notifications::mark_all_read),
        )
        .route(
            "/notifications/:id/read",
            post(endpoints::notifications::mark_read),
        )
        .route(
            "/uploads",
            post(endpoints::uploads::upload)
                .layer(DefaultBodyLimit::max(endpoints::uploads::UPLOAD_BODY_LIMIT)),
        )
        .route("/dashboard", get(endpoints::dashboard::get))
        .route("/clinician/patients", get(endpoints::clinician::patients))
        .route(
            "/clinician/patients/:id",
            get(endpoints::clinician::patient_detail),
        )
        .route("/admin/users", get(endpoints::admin::list_users))
        .route(
            "/admin/users/:id",
            axum::routing::patch(endpoints::admin::update_user),
        )
        .route(
            "/admin/users/:id/approve",
            post(endpoints::admin::approve_user),
        )
        .route(
            "/admin/modules",
            get(endpoints::admin::list_modules).post(endpoints::admin::create_module),
        )
        .route(
            "/admin/modules/:id",
            put(endpoints::admin::update_module).delete(endpoints::admin::deactivate_module),
        )
        .route(
            "/admin/modules/:id/activate",
            post(endpoints::admin::activate_module),
        )
        .route("/admin/audit", get(endpoints::admin::audit_log))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx.clone()));

    // Unprotected routes (rate-limited and audited, no auth required)
    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/auth/otp/request", post(endpoints::auth::request_otp))
        .route("/auth/otp/verify", post(endpoints::auth::verify_email))
        .route("/auth/password/reset", post(endpoints::auth::reset_password))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit_by_address))
        .layer(axum::Extension(ctx.clone()));

    let app = Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected);

    match cors_layer(ctx.core.config().cors_origin.as_deref()) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::crypto::hash_password;
    use crate::db;
    use crate::models::enums::{Role, UserStatus};
    use crate::test_support::*;

    const PASSWORD: &str = "correct horse 42";

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Insert an account with a known password, bypassing registration.
    fn seed_user(core: &CoreState, email: &str, role: Role, status: UserStatus) -> uuid::Uuid {
        let conn = core.open_db().unwrap();
        let mut user = user_fixture(email, role, status);
        user.password_hash = hash_password(PASSWORD, TEST_PASSWORD_ITERATIONS);
        db::insert_user(&conn, &user).unwrap();
        user.id
    }

    async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
        send(
            app,
            request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            ),
        )
        .await
    }

    async fn token_for(app: &Router, email: &str) -> String {
        let (status, body) = login(app, email, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    fn emailed_code(harness: &TestHarness, email: &str) -> String {
        let message = harness.mailer.last_to(email).expect("no mail sent");
        message
            .text
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| part.len() == 6)
            .expect("no code in mail")
            .to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());

        let (status, body) = send(&app, request("GET", "/api/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], true);
        assert_eq!(body["ai_enabled"], false);
        assert_eq!(body["uploads_enabled"], true);
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());

        for uri in ["/api/profile", "/api/dashboard", "/api/assessments", "/api/admin/users"] {
            let (status, body) = send(&app, request("GET", uri, None, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["error"]["code"], "AUTH_REQUIRED");
        }
    }

    #[tokio::test]
    async fn invalid_token_returns_401() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());

        let (status, _) = send(&app, request("GET", "/api/profile", Some("not-a-token"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn not_found_for_unknown_route() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());

        let response = app
            .oneshot(request("GET", "/api/nonexistent", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_then_login_returns_session() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "name": "Ada Patient", "email": "Ada@Example.com", "password": PASSWORD })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "ada@example.com");
        assert_eq!(body["user"]["role"], "patient");
        assert_eq!(body["requires_approval"], false);
        assert_eq!(body["verification_sent"], true);
        assert!(body["user"].get("password_hash").is_none());

        let token = token_for(&app, "ada@example.com").await;
        let response = app
            .clone()
            .oneshot(request("GET", "/api/auth/session", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");

        let (status, profile) = send(&app, request("GET", "/api/profile", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["name"], "Ada Patient");
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "taken@example.com", Role::Patient, UserStatus::Active);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "name": "Again", "email": "taken@example.com", "password": PASSWORD })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "p@example.com", Role::Patient, UserStatus::Active);

        let (status, body) = login(&app, "p@example.com", "wrong password 1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn email_verification_with_emailed_code() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "name": "Ben", "email": "ben@example.com", "password": PASSWORD })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = emailed_code(&harness, "ben@example.com");

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/auth/otp/verify",
                None,
                Some(json!({ "email": "ben@example.com", "code": code })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let conn = harness.core.open_db().unwrap();
        let user = db::get_user_by_email(&conn, "ben@example.com").unwrap().unwrap();
        assert!(user.email_verified);
    }

    #[tokio::test]
    async fn password_reset_with_emailed_code() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "cleo@example.com", Role::Patient, UserStatus::Active);

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/auth/otp/request",
                None,
                Some(json!({ "email": "cleo@example.com", "purpose": "reset_password" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let code = emailed_code(&harness, "cleo@example.com");

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/auth/password/reset",
                None,
                Some(json!({ "email": "cleo@example.com", "code": code, "new_password": "brand new pass 7" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = login(&app, "cleo@example.com", PASSWORD).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = login(&app, "cleo@example.com", "brand new pass 7").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn otp_request_for_unknown_email_is_accepted() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/auth/otp/request",
                None,
                Some(json!({ "email": "ghost@example.com", "purpose": "verify_email" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body["message"].is_string());
        assert!(harness.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn pending_clinician_signs_in_after_approval() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "admin@example.com", Role::Admin, UserStatus::Active);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "name": "Dr Dee",
                    "email": "dee@example.com",
                    "password": PASSWORD,
                    "role": "clinician",
                    "specialty": "General practice",
                    "license_number": "GP-1234"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["requires_approval"], true);
        let clinician_id = body["user"]["id"].as_str().unwrap().to_string();

        let (status, body) = login(&app, "dee@example.com", PASSWORD).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "ACCOUNT_INACTIVE");

        let admin = token_for(&app, "admin@example.com").await;
        let (status, body) = send(
            &app,
            request("POST", &format!("/api/admin/users/{clinician_id}/approve"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "active");

        // Approving twice is a conflict
        let (status, _) = send(
            &app,
            request("POST", &format!("/api/admin/users/{clinician_id}/approve"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let clinician = token_for(&app, "dee@example.com").await;
        let (status, notifications) =
            send(&app, request("GET", "/api/notifications", Some(&clinician), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(notifications[0]["kind"], "account_approved");
    }

    #[tokio::test]
    async fn assessment_submit_claim_review_flow() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        let module = insert_module_fixture(&harness.core.open_db().unwrap());
        seed_user(&harness.core, "pat@example.com", Role::Patient, UserStatus::Active);
        seed_user(&harness.core, "doc@example.com", Role::Clinician, UserStatus::Active);
        let patient = token_for(&app, "pat@example.com").await;
        let clinician = token_for(&app, "doc@example.com").await;

        let (status, session) = send(
            &app,
            request(
                "POST",
                "/api/assessments",
                Some(&patient),
                Some(json!({
                    "module_id": module.id,
                    "responses": [
                        { "question_id": "location", "answer": "one_side" },
                        { "question_id": "features", "answer": ["nausea", "light"] },
                        { "question_id": "severity", "answer": 7 }
                    ]
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{session}");
        assert_eq!(session["status"], "pending_review");
        assert_eq!(session["provisional_diagnosis"], "Migraine");
        let id = session["id"].as_str().unwrap().to_string();

        // Clinicians see it in their list; patients cannot claim
        let (status, list) = send(&app, request("GET", "/api/assessments", Some(&clinician), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            request("POST", &format!("/api/assessments/{id}/claim"), Some(&patient), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, claimed) = send(
            &app,
            request("POST", &format!("/api/assessments/{id}/claim"), Some(&clinician), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(claimed["status"], "in_review");

        let (status, reviewed) = send(
            &app,
            request(
                "POST",
                &format!("/api/assessments/{id}/review"),
                Some(&clinician),
                Some(json!({ "final_diagnosis": "Migraine without aura", "notes": "Triptan trial" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reviewed["status"], "reviewed");

        let (status, mine) = send(
            &app,
            request("GET", &format!("/api/assessments/{id}"), Some(&patient), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine["final_diagnosis"], "Migraine without aura");

        let (status, count) = send(
            &app,
            request("GET", "/api/notifications/unread-count", Some(&patient), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(count["count"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn other_patients_assessments_are_hidden() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        let module = insert_module_fixture(&harness.core.open_db().unwrap());
        seed_user(&harness.core, "a@example.com", Role::Patient, UserStatus::Active);
        seed_user(&harness.core, "b@example.com", Role::Patient, UserStatus::Active);
        let a = token_for(&app, "a@example.com").await;
        let b = token_for(&app, "b@example.com").await;

        let (_, session) = send(
            &app,
            request(
                "POST",
                "/api/assessments",
                Some(&a),
                Some(json!({
                    "module_id": module.id,
                    "responses": [
                        { "question_id": "location", "answer": "band" },
                        { "question_id": "severity", "answer": 3 }
                    ]
                })),
            ),
        )
        .await;
        let id = session["id"].as_str().unwrap();

        let (status, _) = send(&app, request("GET", &format!("/api/assessments/{id}"), Some(&b), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = send(&app, request("GET", "/api/assessments", Some(&b), None)).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn patients_are_forbidden_from_staff_routes() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "pat@example.com", Role::Patient, UserStatus::Active);
        let patient = token_for(&app, "pat@example.com").await;

        for uri in ["/api/admin/users", "/api/admin/audit", "/api/clinician/patients"] {
            let (status, _) = send(&app, request("GET", uri, Some(&patient), None)).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn admin_cannot_change_own_account() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        let admin_id = seed_user(&harness.core, "admin@example.com", Role::Admin, UserStatus::Active);
        let patient_id = seed_user(&harness.core, "p@example.com", Role::Patient, UserStatus::Active);
        let admin = token_for(&app, "admin@example.com").await;

        let (status, _) = send(
            &app,
            request(
                "PATCH",
                &format!("/api/admin/users/{admin_id}"),
                Some(&admin),
                Some(json!({ "status": "suspended" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            request(
                "PATCH",
                &format!("/api/admin/users/{patient_id}"),
                Some(&admin),
                Some(json!({ "status": "suspended" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "suspended");

        let (status, _) = login(&app, "p@example.com", PASSWORD).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn suspension_and_demotion_apply_to_issued_tokens() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "admin@example.com", Role::Admin, UserStatus::Active);
        let doc_id = seed_user(&harness.core, "doc@example.com", Role::Clinician, UserStatus::Active);
        let nurse_id = seed_user(&harness.core, "nurse@example.com", Role::Clinician, UserStatus::Active);
        let admin = token_for(&app, "admin@example.com").await;
        let doc = token_for(&app, "doc@example.com").await;
        let nurse = token_for(&app, "nurse@example.com").await;

        let (status, _) = send(&app, request("GET", "/api/clinician/patients", Some(&doc), None)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            request(
                "PATCH",
                &format!("/api/admin/users/{doc_id}"),
                Some(&admin),
                Some(json!({ "status": "suspended", "role": "patient" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        for uri in ["/api/clinician/patients", "/api/assessments", "/api/dashboard"] {
            let (status, body) = send(&app, request("GET", uri, Some(&doc), None)).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(body["error"]["code"], "ACCOUNT_INACTIVE");
        }

        let (status, _) = send(
            &app,
            request(
                "PATCH",
                &format!("/api/admin/users/{nurse_id}"),
                Some(&admin),
                Some(json!({ "role": "patient" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, request("GET", "/api/clinician/patients", Some(&nurse), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        let (status, body) = send(&app, request("GET", "/api/dashboard", Some(&nurse), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "patient");
    }

    #[tokio::test]
    async fn rotating_bearer_tokens_share_the_public_rate_limit() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());

        let mut limited = 0;
        for i in 0..150 {
            let (status, body) = send(
                &app,
                request(
                    "POST",
                    "/api/auth/login",
                    Some(&format!("junk-token-{i}")),
                    Some(json!({ "email": format!("nobody{i}@example.com"), "password": "wrong password 1" })),
                ),
            )
            .await;
            if status == StatusCode::TOO_MANY_REQUESTS {
                assert_eq!(body["error"]["code"], "RATE_LIMITED");
                limited += 1;
            }
        }
        assert_eq!(limited, 50);
    }

    #[tokio::test]
    async fn admin_module_lifecycle() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "admin@example.com", Role::Admin, UserStatus::Active);
        seed_user(&harness.core, "pat@example.com", Role::Patient, UserStatus::Active);
        let admin = token_for(&app, "admin@example.com").await;
        let patient = token_for(&app, "pat@example.com").await;
        let template = module_fixture();

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/admin/modules",
                Some(&admin),
                Some(json!({ "name": "Empty", "body_region": "knee", "questions": [], "conditions": [] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, created) = send(
            &app,
            request(
                "POST",
                "/api/admin/modules",
                Some(&admin),
                Some(json!({
                    "name": "Head pain",
                    "body_region": "head",
                    "questions": template.questions,
                    "conditions": template.conditions,
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["version"], 1);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, updated) = send(
            &app,
            request(
                "PUT",
                &format!("/api/admin/modules/{id}"),
                Some(&admin),
                Some(json!({
                    "name": "Head pain (revised)",
                    "body_region": "head",
                    "questions": template.questions,
                    "conditions": template.conditions,
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["version"], 2);

        let (status, _) = send(
            &app,
            request("DELETE", &format!("/api/admin/modules/{id}"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, request("GET", &format!("/api/modules/{id}"), Some(&patient), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, all) = send(&app, request("GET", "/api/admin/modules", Some(&admin), None)).await;
        assert_eq!(all[0]["active"], false);

        let (status, reactivated) = send(
            &app,
            request("POST", &format!("/api/admin/modules/{id}/activate"), Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reactivated["active"], true);
    }

    #[tokio::test]
    async fn admin_audit_includes_recent_requests() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "admin@example.com", Role::Admin, UserStatus::Active);
        let admin = token_for(&app, "admin@example.com").await;
        send(&app, request("GET", "/api/profile", Some(&admin), None)).await;

        let (status, entries) = send(&app, request("GET", "/api/admin/audit", Some(&admin), None)).await;
        assert_eq!(status, StatusCode::OK);
        let actions: Vec<&str> = entries
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["action"].as_str())
            .collect();
        assert!(actions.contains(&"GET /api/profile"));
    }

    fn multipart(filename: &str, content_type: &str, bytes: &[u8]) -> (String, Vec<u8>) {
        let boundary = "cdss-test-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    fn upload_request(token: &str, content_type: String, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/uploads")
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_stores_file_with_media_host() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "pat@example.com", Role::Patient, UserStatus::Active);
        let patient = token_for(&app, "pat@example.com").await;

        let (content_type, body) = multipart("rash.png", "image/png", &[0x89, b'P', b'N', b'G', 0, 1, 2]);
        let (status, stored) = send(&app, upload_request(&patient, content_type, body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(stored["url"].as_str().unwrap().ends_with("rash.png"));
        assert_eq!(harness.media.count(), 1);
    }

    #[tokio::test]
    async fn upload_rejects_unsupported_type() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "pat@example.com", Role::Patient, UserStatus::Active);
        let patient = token_for(&app, "pat@example.com").await;

        let (content_type, body) = multipart("notes.exe", "application/x-msdownload", b"MZ");
        let (status, _) = send(&app, upload_request(&patient, content_type, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(harness.media.count(), 0);
    }

    #[tokio::test]
    async fn dashboard_matches_caller_role() {
        let harness = test_harness(None);
        let app = api_router(harness.core.clone());
        seed_user(&harness.core, "doc@example.com", Role::Clinician, UserStatus::Active);
        let clinician = token_for(&app, "doc@example.com").await;

        let (status, body) = send(&app, request("GET", "/api/dashboard", Some(&clinician), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "clinician");
        assert!(body["review_queue"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::ServerConfig::for_data_dir(dir.path());
        config.session_secret = Some("secret".into());
        config.ai.enabled = false;
        config.cors_origin = Some("https://portal.example.com".into());
        let core = Arc::new(CoreState::new(config).unwrap());
        let app = api_router(core);

        let req = Request::builder()
            .method("GET")
            .uri("/api/health")
            .header("Origin", "https://portal.example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://portal.example.com"
        );
    }
}
