//! Persistence backends for gateway state
//!
//! Users, sessions, the role registry, and the audit stream all live behind
//! the `GatewayStore` trait so the core services can be tested without disk.
//! Writes are serialized through each backend's cache lock, which gives
//! read-your-writes semantics for concurrent requests touching the same
//! record.

mod file;

pub use file::FileStore;

use crate::audit::AuditEvent;
use crate::auth::{Session, User};
use crate::rbac::Role;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Storage-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Trait for gateway state storage backends
#[async_trait]
pub trait GatewayStore: Send + Sync {
    /// Get a user by id
    async fn user(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Get a user by login name
    async fn user_by_username(&self, name: &str) -> Result<Option<User>, StoreError>;

    /// Insert or replace a user record
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    /// List all users
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Get a session by id
    async fn session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Insert or replace a session record
    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError>;

    /// All sessions owned by a user
    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError>;

    /// List all sessions
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    /// Get a role by id
    async fn role(&self, id: &str) -> Result<Option<Role>, StoreError>;

    /// List the whole role registry
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    /// Insert or replace a role definition
    async fn upsert_role(&self, role: &Role) -> Result<(), StoreError>;

    /// Append an audit event, truncating oldest-first at the retention cap
    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError>;

    /// Most recent audit events, newest first
    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEvent>, StoreError>;

    /// Check that the backend is available and healthy
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Default audit retention in persisted stores
pub const DEFAULT_AUDIT_RETENTION: usize = 10_000;

/// In-memory store for tests and ephemeral setups
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
    max_audit_events: usize,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    username_index: HashMap<String, String>,
    sessions: HashMap<String, Session>,
    roles: HashMap<String, Role>,
    audit: VecDeque<AuditEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryState::default()),
            max_audit_events: DEFAULT_AUDIT_RETENTION,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayStore for MemoryStore {
    async fn user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().users.get(id).cloned())
    }

    async fn user_by_username(&self, name: &str) -> Result<Option<User>, StoreError> {
        let state = self.inner.read();
        Ok(state
            .username_index
            .get(name)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.inner.write();
        state
            .username_index
            .insert(user.username.clone(), user.id.clone());
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().users.values().cloned().collect())
    }

    async fn session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.inner.read().sessions.get(id).cloned())
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut state = self.inner.write();
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .inner
            .read()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.inner.read().sessions.values().cloned().collect())
    }

    async fn role(&self, id: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.inner.read().roles.get(id).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.inner.read().roles.values().cloned().collect())
    }

    async fn upsert_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut state = self.inner.write();
        state.roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let mut state = self.inner.write();
        state.audit.push_back(event.clone());
        while state.audit.len() > self.max_audit_events {
            state.audit.pop_front();
        }
        Ok(())
    }

    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .inner
            .read()
            .audit
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
