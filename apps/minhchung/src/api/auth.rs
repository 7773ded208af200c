//! # Authentication Module
//!
//! Bearer-token authentication and role checks for the HTTP API.
//!
//! ## Configuration
//!
//! Tokens come from `[[auth.tokens]]` in `minhchung.toml` or from
//! `MINHCHUNG_API_KEY`. With no tokens configured every request acts as the
//! system user with the admin role.
//!
//! ## Usage
//!
//! ```text
//! Authorization: Bearer <token>
//! ```

use super::error::ApiError;
use crate::config::{AuthConfig, Role};
use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use minhchung_core::UserId;
use std::sync::Arc;
use subtle::{Choice, ConstantTimeEq};

// =============================================================================
// CALLER
// =============================================================================

/// The authenticated caller, stored as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: Role,
}

impl AuthUser {
    /// Acts for every request while authentication is disabled.
    pub const SYSTEM: Self = Self {
        user_id: UserId::SYSTEM,
        role: Role::Admin,
    };

    /// Fail with 403 unless the caller holds at least `role`.
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.role >= role {
            Ok(())
        } else {
            tracing::warn!(
                event = "auth_forbidden",
                user_id = %self.user_id,
                role = %self.role,
                required = %role,
                "Insufficient role"
            );
            Err(ApiError::Forbidden(format!(
                "Role '{}' required, caller has '{}'",
                role, self.role
            )))
        }
    }
}

// =============================================================================
// TOKEN CHECK
// =============================================================================

struct Entry {
    token: Vec<u8>,
    user: AuthUser,
}

/// Holds the accepted tokens.
pub struct Authenticator {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("tokens", &self.entries.len())
            .finish()
    }
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            entries: config
                .tokens
                .iter()
                .map(|t| Entry {
                    token: t.token.as_bytes().to_vec(),
                    user: AuthUser {
                        user_id: UserId(t.user_id),
                        role: t.role,
                    },
                })
                .collect(),
        }
    }

    /// Accept every request as [`AuthUser::SYSTEM`].
    pub fn disabled() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Resolve a presented token to its user.
    ///
    /// Every configured token is compared, each in constant time, so timing
    /// reveals neither which token matched nor how long it is.
    pub fn authenticate(&self, presented: &str) -> Option<AuthUser> {
        let presented = presented.as_bytes();
        let mut found = None;
        for entry in &self.entries {
            if bool::from(padded_eq(presented, &entry.token)) {
                found = Some(entry.user);
            }
        }
        found
    }
}

/// Constant-time equality over both inputs padded to the same length.
fn padded_eq(provided: &[u8], expected: &[u8]) -> Choice {
    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let same_len = Choice::from(u8::from(provided.len() == expected.len()));
    padded_provided.ct_eq(&padded_expected) & same_len
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Authentication middleware.
///
/// - `/health` is always allowed (for load balancer checks)
/// - with auth disabled the request runs as [`AuthUser::SYSTEM`]
/// - otherwise a valid `Authorization: Bearer <token>` is required
pub async fn auth_middleware(
    State(auth): State<Arc<Authenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    if !auth.is_enabled() {
        request.extensions_mut().insert(AuthUser::SYSTEM);
        return next.run(request).await;
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header_value) = header_value else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_authorization_header",
            "Missing Authorization header"
        );
        return ApiError::Unauthorized.into_response();
    };

    let token = header_value
        .strip_prefix("Bearer ")
        .unwrap_or(header_value)
        .trim();

    match auth.authenticate(token) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_token",
                "Authentication failed: invalid token"
            );
            ApiError::Unauthorized.into_response()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
