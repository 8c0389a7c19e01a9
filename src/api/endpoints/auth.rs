//! Authentication endpoints.
//!
//! Public (rate-limited only):
//! - `POST /api/auth/register`
//! - `POST /api/auth/login`
//! - `POST /api/auth/otp/request`
//! - `POST /api/auth/otp/verify`
//! - `POST /api/auth/password/reset`
//!
//! Protected:
//! - `GET /api/auth/session`: the caller's verified claims

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::accounts::{self, RegisterInput};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::config::mask_email;
use crate::core_state::CoreState;
use crate::crypto::SessionClaims;
use crate::mail;
use crate::models::enums::UserStatus;
use crate::models::UserProfile;
use crate::otp::OtpPurpose;

/// Email a freshly issued code. Delivery failures are logged, not surfaced,
/// so the response never reveals whether the address is registered.
fn deliver_code(core: &CoreState, email: &str, purpose: OtpPurpose, code: &str) -> bool {
    let message = mail::otp_message(&core.config().mail.from, email, purpose.subject(), code);
    match core.mailer().send(&message) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(email = %mask_email(email), error = %e, "One-time code delivery failed");
            false
        }
    }
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: UserProfile,
    /// Clinician accounts wait for an administrator.
    pub requires_approval: bool,
    pub verification_sent: bool,
}

/// `POST /api/auth/register`: create a patient or clinician account.
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let response = super::with_db(&ctx, move |core, conn| {
        let user = accounts::register(conn, input, core.config().password_iterations)?;

        // Registration stands even if the verification code can't be issued
        let verification_sent =
            match accounts::request_otp(conn, core.otp_store(), &user.email, OtpPurpose::VerifyEmail) {
                Ok(Some(code)) => deliver_code(core, &user.email, OtpPurpose::VerifyEmail, &code),
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Verification code not issued");
                    false
                }
            };

        Ok(RegisterResponse {
            requires_approval: user.status == UserStatus::Pending,
            user: UserProfile::from(&user),
            verification_sent,
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// RFC 3339.
    pub expires_at: String,
    pub user: UserProfile,
}

/// `POST /api/auth/login`: exchange credentials for a session token.
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = super::with_db(&ctx, move |core, conn| {
        let config = core.config();
        let user = accounts::authenticate(
            conn,
            core.login_lockout(),
            &request.email,
            &request.password,
            config.require_verified_email,
            config.password_iterations,
        )?;
        let (token, claims) = core.issue_session(&user)?;
        tracing::info!(user_id = %user.id, role = %user.role, "Signed in");

        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default();
        Ok(LoginResponse {
            token,
            expires_at,
            user: UserProfile::from(&user),
        })
    })
    .await?;

    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct OtpRequest {
    pub email: String,
    pub purpose: OtpPurpose,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub message: &'static str,
}

/// `POST /api/auth/otp/request`: send a verification or reset code.
///
/// Always 202 for well-formed requests, whether or not the account exists.
pub async fn request_otp(
    State(ctx): State<ApiContext>,
    Json(request): Json<OtpRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    super::with_db(&ctx, move |core, conn| {
        let code = accounts::request_otp(conn, core.otp_store(), &request.email, request.purpose)?;
        if let Some(code) = code {
            deliver_code(core, &request.email.trim().to_lowercase(), request.purpose, &code);
        }
        Ok(())
    })
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: "If the address is registered, a code has been sent",
        }),
    ))
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

/// `POST /api/auth/otp/verify`: confirm an email address.
pub async fn verify_email(
    State(ctx): State<ApiContext>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<StatusCode, ApiError> {
    super::with_db(&ctx, move |core, conn| {
        accounts::verify_email(conn, core.otp_store(), &request.email, &request.code)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// `POST /api/auth/password/reset`: set a new password with a reset code.
pub async fn reset_password(
    State(ctx): State<ApiContext>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    super::with_db(&ctx, move |core, conn| {
        accounts::reset_password(
            conn,
            core.otp_store(),
            &request.email,
            &request.code,
            &request.new_password,
            core.config().password_iterations,
        )?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/session`: the claims carried by the caller's token.
pub async fn session(Extension(user): Extension<AuthUser>) -> Json<SessionClaims> {
    Json(user.claims)
}
