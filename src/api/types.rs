//! Shared types for the HTTP API layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::crypto::SessionClaims;
use crate::models::enums::Role;
use crate::models::Actor;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
/// Wraps `CoreState` plus API-specific caches.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Authenticated caller: injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Verified session claims, injected into request extensions by the auth
/// middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: SessionClaims,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.claims.sub
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.claims.sub,
            role: self.claims.role,
            name: self.claims.name.clone(),
        }
    }

    /// 403 unless the caller holds one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.claims.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "This action is not available to the {} role",
                self.claims.role
            )))
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Rate limiter: per-client sliding window
// ═══════════════════════════════════════════════════════════

const HOUR: Duration = Duration::from_secs(3600);
const SWEEP_THRESHOLD: usize = 1_024;

/// Per-client rate limiter with per-minute and per-hour limits.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
    per_hour: u32,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(100, 1000)
    }

    pub fn with_limits(per_minute: u32, per_hour: u32) -> Self {
        Self {
            windows: HashMap::new(),
            per_minute,
            per_hour,
            last_sweep: Instant::now(),
        }
    }

    /// Check if a client is within rate limits. Returns `Ok(())` or
    /// `Err(retry_after_secs)` if exceeded.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &str, now: Instant) -> Result<(), u64> {
        if self.windows.len() >= SWEEP_THRESHOLD
            && now.saturating_duration_since(self.last_sweep) >= Duration::from_secs(60)
        {
            self.sweep(now);
        }

        let entries = self.windows.entry(key.to_string()).or_default();

        entries.retain(|ts| now.saturating_duration_since(*ts) < HOUR);

        let last_minute = entries
            .iter()
            .filter(|ts| now.saturating_duration_since(**ts) < Duration::from_secs(60))
            .count() as u32;
        if last_minute >= self.per_minute {
            return Err(60);
        }

        if entries.len() as u32 >= self.per_hour {
            return Err(3600);
        }

        entries.push(now);
        Ok(())
    }

    /// Forget clients with no requests in the last hour.
    fn sweep(&mut self, now: Instant) {
        self.windows.retain(|_, entries| {
            entries.retain(|ts| now.saturating_duration_since(*ts) < HOUR);
            !entries.is_empty()
        });
        self.last_sweep = now;
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> SessionClaims {
        SessionClaims {
            sub: Uuid::new_v4(),
            email: "someone@example.com".into(),
            name: "Someone".into(),
            role,
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[test]
    fn rate_limiter_allows_within_limits() {
        let mut limiter = RateLimiter::new();
        for _ in 0..99 {
            assert!(limiter.check("client-1").is_ok());
        }
    }

    #[test]
    fn rate_limiter_blocks_over_minute_limit() {
        let mut limiter = RateLimiter::with_limits(5, 1000);
        for _ in 0..5 {
            assert!(limiter.check("client-1").is_ok());
        }
        assert_eq!(limiter.check("client-1"), Err(60));
    }

    #[test]
    fn rate_limiter_blocks_over_hour_limit() {
        let mut limiter = RateLimiter::with_limits(1000, 3);
        for _ in 0..3 {
            assert!(limiter.check("client-1").is_ok());
        }
        assert_eq!(limiter.check("client-1"), Err(3600));
    }

    #[test]
    fn rate_limiter_keys_are_independent() {
        let mut limiter = RateLimiter::with_limits(1, 1000);
        assert!(limiter.check("client-1").is_ok());
        assert!(limiter.check("client-2").is_ok());
        assert!(limiter.check("client-1").is_err());
    }

    #[test]
    fn idle_clients_are_forgotten() {
        let mut limiter = RateLimiter::new();
        let t0 = Instant::now();
        for i in 0..SWEEP_THRESHOLD * 2 {
            assert!(limiter.check_at(&format!("ip:10.0.{}.{}", i / 256, i % 256), t0).is_ok());
        }
        assert_eq!(limiter.tracked_clients(), SWEEP_THRESHOLD * 2);

        let later = t0 + Duration::from_secs(2 * 3600);
        assert!(limiter.check_at("ip:192.0.2.1", later).is_ok());
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn require_role_rejects_other_roles() {
        let patient = AuthUser {
            claims: claims(Role::Patient),
        };
        assert!(patient.require_role(&[Role::Patient]).is_ok());
        assert!(matches!(
            patient.require_role(&[Role::Clinician, Role::Admin]),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn actor_copies_claims() {
        let user = AuthUser {
            claims: claims(Role::Clinician),
        };
        let actor = user.actor();
        assert_eq!(actor.id, user.id());
        assert!(actor.is_staff());
    }
}
