//! Authentication service for cryptgate
//!
//! Verifies operator identity, issues and refreshes signed tokens, and
//! manages server-side sessions. Sessions are the revocation mechanism: an
//! access token is only as alive as the session it names, so logout and
//! administrative revocation take effect immediately regardless of token
//! lifetime.

mod ratelimit;
mod tokens;
mod types;

pub use ratelimit::LoginRateLimiter;
pub use tokens::{Claims, Grants, TokenKind, TokenSigner, UserSummary};
pub use types::{AuthSuccess, Session, SessionOrigin, User};

use crate::audit::{AuditKind, AuditLog};
use crate::rbac::RbacEngine;
use crate::store::{GatewayStore, StoreError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// A well-formed bcrypt hash verified on the unknown-user path so lookup
/// misses cost the same as secret mismatches
const DUMMY_HASH: &str = "$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";

/// Entropy in a session identifier
const SESSION_ID_BYTES: usize = 32;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is invalid")]
    TokenInvalid,

    #[error("Session is no longer active")]
    SessionExpired,

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Stable machine-readable code for the serving layer
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenInvalid => "INVALID_TOKEN",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::Signing(_) | AuthError::Store(_) => "AUTH_ERROR",
        }
    }
}

/// Issues, verifies, refreshes, and revokes operator tokens
pub struct AuthService {
    store: Arc<dyn GatewayStore>,
    rbac: Arc<RbacEngine>,
    tokens: TokenSigner,
    audit: Arc<AuditLog>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn GatewayStore>,
        rbac: Arc<RbacEngine>,
        tokens: TokenSigner,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            rbac,
            tokens,
            audit,
        }
    }

    /// Verify a username/secret pair and issue a token pair bound to a new
    /// session.
    ///
    /// Unknown users, disabled accounts, and secret mismatches all fail with
    /// `InvalidCredentials`; each path runs exactly one bcrypt verification
    /// so callers cannot distinguish them by timing.
    pub async fn authenticate(
        &self,
        username: &str,
        secret: &SecretString,
        origin: SessionOrigin,
    ) -> Result<AuthSuccess, AuthError> {
        let user = self.store.user_by_username(username).await?;

        let Some(mut user) = user else {
            // Burn a verification against the dummy hash
            let _ = bcrypt::verify(secret.expose_secret(), DUMMY_HASH);
            self.audit_auth_failed(username, "unknown user").await;
            return Err(AuthError::InvalidCredentials);
        };

        let secret_ok =
            bcrypt::verify(secret.expose_secret(), &user.password_hash).unwrap_or(false);

        if !secret_ok {
            self.audit_auth_failed(username, "secret mismatch").await;
            return Err(AuthError::InvalidCredentials);
        }

        if !user.enabled {
            self.audit_auth_failed(username, "account disabled").await;
            return Err(AuthError::InvalidCredentials);
        }

        let session = Session::new(new_session_id(), &user.id, origin);
        self.store.upsert_session(&session).await?;

        user.last_login = Some(Utc::now());
        self.store.upsert_user(&user).await?;

        let summary = UserSummary::of(&user);
        let grants = self.grants_for(&user).await;
        let access_token = self.tokens.mint_access(&summary, grants, &session.id)?;
        let refresh_token = self.tokens.mint_refresh(&user.id, &session.id)?;

        self.audit
            .record(
                AuditKind::AuthSuccess,
                json!({
                    "user_id": user.id,
                    "username": user.username,
                    "session_id": session.id,
                    "origin": session.origin,
                }),
            )
            .await;

        Ok(AuthSuccess {
            user: summary,
            access_token,
            refresh_token,
            session_id: session.id,
        })
    }

    /// Validate an access token cryptographically, then against the session
    /// store. An inactive session means the token is revoked even while its
    /// signature and expiry are still good.
    pub async fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.tokens.decode(token)?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::TokenInvalid);
        }

        let session = self.store.session(&claims.sid).await?;
        match session {
            Some(mut session) if session.active => {
                session.last_activity = Utc::now();
                if let Err(e) = self.store.upsert_session(&session).await {
                    warn!(error = %e, session = %session.id, "Failed to touch session activity");
                }
                Ok(claims)
            }
            _ => Err(AuthError::SessionExpired),
        }
    }

    /// Exchange a refresh token for a fresh access token.
    ///
    /// The current user record is re-loaded so role and permission changes
    /// take effect without re-login. The refresh token itself is neither
    /// rotated nor extended.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.tokens.decode(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AuthError::TokenInvalid);
        }

        let user = self
            .store
            .user(&claims.sub)
            .await?
            .filter(|u| u.enabled)
            .ok_or(AuthError::InvalidCredentials)?;

        match self.store.session(&claims.sid).await? {
            Some(session) if session.active => {}
            _ => return Err(AuthError::SessionExpired),
        }

        let summary = UserSummary::of(&user);
        let grants = self.grants_for(&user).await;
        let access_token = self.tokens.mint_access(&summary, grants, &claims.sid)?;

        self.audit
            .record(
                AuditKind::TokenRefreshed,
                json!({ "user_id": user.id, "session_id": claims.sid }),
            )
            .await;

        Ok(access_token)
    }

    /// Mark a session inactive. Idempotent: unknown or already-inactive
    /// sessions are a no-op, never an error.
    pub async fn logout(&self, session_id: &str) {
        match self.store.session(session_id).await {
            Ok(Some(mut session)) if session.active => {
                session.active = false;
                session.last_activity = Utc::now();
                if let Err(e) = self.store.upsert_session(&session).await {
                    warn!(error = %e, session = %session_id, "Failed to deactivate session");
                    return;
                }
                self.audit
                    .record(
                        AuditKind::Logout,
                        json!({ "session_id": session_id, "user_id": session.user_id }),
                    )
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, session = %session_id, "Session lookup failed during logout");
            }
        }
    }

    /// Administrative sweep: deactivate every active session owned by a user
    pub async fn revoke_user_sessions(&self, user_id: &str) -> Result<usize, AuthError> {
        let sessions = self.store.sessions_for_user(user_id).await?;
        let mut revoked = 0;
        for mut session in sessions.into_iter().filter(|s| s.active) {
            session.active = false;
            session.last_activity = Utc::now();
            self.store.upsert_session(&session).await?;
            revoked += 1;
        }

        if revoked > 0 {
            self.audit
                .record(
                    AuditKind::SessionRevoked,
                    json!({ "user_id": user_id, "count": revoked }),
                )
                .await;
        }

        Ok(revoked)
    }

    /// Deactivate sessions idle longer than `max_idle`; returns the count
    pub async fn sweep_expired_sessions(
        &self,
        max_idle: chrono::Duration,
    ) -> Result<usize, AuthError> {
        let now = Utc::now();
        let sessions = self.store.list_sessions().await?;
        let mut swept = 0;
        for mut session in sessions
            .into_iter()
            .filter(|s| s.active && s.idle_longer_than(max_idle, now))
        {
            session.active = false;
            self.store.upsert_session(&session).await?;
            swept += 1;
        }
        Ok(swept)
    }

    /// Per-resource permission grants embedded in access tokens: the role's
    /// effective access union the user's own override list, each carrying
    /// the role's effective permissions
    async fn grants_for(&self, user: &User) -> Grants {
        let mut permissions: Vec<_> = self
            .rbac
            .effective_permissions(&user.role_id)
            .await
            .into_iter()
            .collect();
        permissions.sort();

        let mut patterns = self.rbac.effective_resource_access(&user.role_id).await;
        patterns.extend(user.resource_access.iter().cloned());

        patterns
            .into_iter()
            .map(|pattern| (pattern, permissions.clone()))
            .collect()
    }

    async fn audit_auth_failed(&self, username: &str, reason: &str) {
        // Reason goes to the audit trail only; the caller sees a single
        // undifferentiated InvalidCredentials. The secret is never logged.
        self.audit
            .record(
                AuditKind::AuthFailed,
                json!({ "username": username, "reason": reason }),
            )
            .await;
    }
}

/// Generate an opaque, unguessable session identifier
fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
