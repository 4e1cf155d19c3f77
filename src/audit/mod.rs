//! Append-only audit log
//!
//! Every security-relevant occurrence (logins, denials, command dispatches)
//! lands here. Events are kept in a bounded in-memory ring and mirrored to
//! the store best-effort: a failing sink must never block or fail the
//! operation being audited.

use crate::store::GatewayStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Default number of events retained in memory and in the store
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Kinds of security-relevant occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    AuthSuccess,
    AuthFailed,
    Logout,
    SessionRevoked,
    TokenRefreshed,
    CommandExecuted,
    CommandBlocked,
    PermissionDenied,
    ConfigLoaded,
}

/// One append-only log entry; never mutated after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    /// Structured payload; free-form per event kind but never contains
    /// secrets
    pub details: serde_json::Value,
}

/// Bounded append-only audit log with best-effort persistence
pub struct AuditLog {
    /// In-memory ring, oldest dropped first
    recent: Mutex<VecDeque<AuditEvent>>,
    /// Durable sink; `None` for purely in-memory use (tests, CLI)
    store: Option<Arc<dyn GatewayStore>>,
    max_events: usize,
}

impl AuditLog {
    /// Create an in-memory audit log
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    /// Create an in-memory audit log with an explicit retention cap
    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            recent: Mutex::new(VecDeque::new()),
            store: None,
            max_events,
        }
    }

    /// Mirror events to a durable store
    pub fn with_store(mut self, store: Arc<dyn GatewayStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Append an event. Infallible by design: a broken sink is warned about
    /// and the primary operation proceeds.
    pub async fn record(&self, kind: AuditKind, details: serde_json::Value) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            kind,
            details,
        };

        {
            let mut recent = self.recent.lock();
            recent.push_back(event.clone());
            while recent.len() > self.max_events {
                recent.pop_front();
            }
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.append_audit(&event).await {
                warn!(error = %e, kind = ?event.kind, "Failed to persist audit event");
            }
        }
    }

    /// Most recent events, newest first
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let recent = self.recent.lock();
        recent.iter().rev().take(limit).cloned().collect()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    /// Whether the log holds no events
    pub fn is_empty(&self) -> bool {
        self.recent.lock().is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
