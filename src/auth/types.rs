//! Account and session types for the authentication service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An operator account.
///
/// Accounts are never physically deleted; they are disabled instead so the
/// audit trail stays resolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier
    pub id: String,
    /// Login name, unique across the store
    pub username: String,
    /// Bcrypt hash of the login secret
    pub password_hash: String,
    /// Role granted to this account
    pub role_id: String,
    /// Per-user resource access on top of the role's (glob patterns).
    /// Usually empty; lets a single account reach an extra controller
    /// without widening the whole role.
    #[serde(default)]
    pub resource_access: Vec<String>,
    /// Disabled accounts fail authentication with the same error as a bad
    /// secret
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create an enabled account with the given bcrypt hash
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            password_hash: password_hash.into(),
            role_id: role_id.into(),
            resource_access: Vec::new(),
            enabled: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    /// Add per-user resource access patterns
    pub fn with_resource_access(mut self, patterns: Vec<String>) -> Self {
        self.resource_access = patterns;
        self
    }
}

/// Where a login came from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOrigin {
    /// Caller network address as reported by the serving layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Client descriptor (user agent or tool name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

/// Server-side record of a login, independent of token lifetime.
///
/// Flipping `active` to false is the revocation mechanism: a token whose
/// session is inactive is dead no matter how much signed lifetime it has
/// left. Sessions are retained after deactivation for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unguessable identifier
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub origin: SessionOrigin,
    pub active: bool,
}

impl Session {
    /// Create an active session for a user
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, origin: SessionOrigin) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            created_at: now,
            last_activity: now,
            origin,
            active: true,
        }
    }

    /// Whether the session has been idle longer than `max_idle`
    pub fn idle_longer_than(&self, max_idle: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > max_idle
    }
}

/// Result of a successful authentication
#[derive(Debug, Clone, Serialize)]
pub struct AuthSuccess {
    pub user: super::tokens::UserSummary,
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
}
