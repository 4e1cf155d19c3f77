//! File-based storage backend
//!
//! Stores users, sessions, roles, and the audit stream in a single JSON file
//! with an in-memory cache. Saves are atomic: the new state is written to a
//! temp file and renamed over the old one. The store holds no remote-host
//! secrets - SSH keys stay on disk and are only referenced by path from the
//! resource registry.

use super::{GatewayStore, StoreError, DEFAULT_AUDIT_RETENTION};
use crate::audit::AuditEvent;
use crate::auth::{Session, User};
use crate::rbac::Role;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::fs;

/// On-disk format version, for future migrations
const FILE_VERSION: u32 = 1;

/// File-backed gateway store
pub struct FileStore {
    path: PathBuf,
    cache: RwLock<StoreCache>,
    max_audit_events: usize,
    /// Serializes save(): all savers share one temp path, so the
    /// snapshot, write, and rename must happen as a unit.
    save_lock: tokio::sync::Mutex<()>,
}

/// In-memory cache of all persisted state
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreCache {
    users: HashMap<String, User>,
    #[serde(default)]
    sessions: HashMap<String, Session>,
    #[serde(default)]
    roles: HashMap<String, Role>,
    #[serde(default)]
    audit: VecDeque<AuditEvent>,

    /// Index: username -> user id. Not serialized, rebuilt on load.
    #[serde(skip)]
    username_index: HashMap<String, String>,
}

impl StoreCache {
    fn rebuild_indexes(&mut self) {
        self.username_index.clear();
        for (id, user) in &self.users {
            self.username_index.insert(user.username.clone(), id.clone());
        }
    }
}

/// On-disk wrapper
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    data: StoreCache,
}

impl FileStore {
    /// Open a file store, loading existing data if present
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_retention(path, DEFAULT_AUDIT_RETENTION).await
    }

    /// Open with an explicit audit retention cap
    pub async fn open_with_retention(
        path: impl AsRef<Path>,
        max_audit_events: usize,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let cache = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            let file: StoreFile = serde_json::from_str(&content)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let mut cache = file.data;
            cache.rebuild_indexes();
            cache
        } else {
            StoreCache::default()
        };

        let store = Self {
            path,
            cache: RwLock::new(cache),
            max_audit_events,
            save_lock: tokio::sync::Mutex::new(()),
        };

        // Make sure the file exists even for a fresh store
        store.save().await?;

        Ok(store)
    }

    /// Save the current state to disk atomically
    async fn save(&self) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;

        let content = {
            let cache = self.cache.read();
            let file = StoreFile {
                version: FILE_VERSION,
                data: StoreCache {
                    users: cache.users.clone(),
                    sessions: cache.sessions.clone(),
                    roles: cache.roles.clone(),
                    audit: cache.audit.clone(),
                    username_index: HashMap::new(),
                },
            };
            serde_json::to_string_pretty(&file)
                .map_err(|e| StoreError::Serialization(e.to_string()))?
        };

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl GatewayStore for FileStore {
    async fn user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.cache.read().users.get(id).cloned())
    }

    async fn user_by_username(&self, name: &str) -> Result<Option<User>, StoreError> {
        let cache = self.cache.read();
        Ok(cache
            .username_index
            .get(name)
            .and_then(|id| cache.users.get(id))
            .cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        {
            let mut cache = self.cache.write();
            cache
                .username_index
                .insert(user.username.clone(), user.id.clone());
            cache.users.insert(user.id.clone(), user.clone());
        }
        self.save().await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.cache.read().users.values().cloned().collect())
    }

    async fn session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.cache.read().sessions.get(id).cloned())
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        {
            let mut cache = self.cache.write();
            cache.sessions.insert(session.id.clone(), session.clone());
        }
        self.save().await
    }

    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .cache
            .read()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.cache.read().sessions.values().cloned().collect())
    }

    async fn role(&self, id: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.cache.read().roles.get(id).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.cache.read().roles.values().cloned().collect())
    }

    async fn upsert_role(&self, role: &Role) -> Result<(), StoreError> {
        {
            let mut cache = self.cache.write();
            cache.roles.insert(role.id.clone(), role.clone());
        }
        self.save().await
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        {
            let mut cache = self.cache.write();
            cache.audit.push_back(event.clone());
            while cache.audit.len() > self.max_audit_events {
                cache.audit.pop_front();
            }
        }
        self.save().await
    }

    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .cache
            .read()
            .audit
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "store file missing: {}",
                self.path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditKind;
    use crate::auth::SessionOrigin;
    use crate::rbac::Permission;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_round_trip_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            let user = User::new("igor", "hash", "operator");
            store.upsert_user(&user).await.unwrap();
            store
                .upsert_session(&Session::new("s1", &user.id, SessionOrigin::default()))
                .await
                .unwrap();
            let role = Role::new(
                "operator",
                "operator",
                50,
                [Permission::View].into_iter().collect(),
            );
            store.upsert_role(&role).await.unwrap();
        }

        let store = FileStore::open(&path).await.unwrap();
        let user = store.user_by_username("igor").await.unwrap().unwrap();
        assert_eq!(user.role_id, "operator");
        assert!(store.session("s1").await.unwrap().is_some());
        assert_eq!(store.list_roles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_truncation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let store = FileStore::open_with_retention(&path, 3).await.unwrap();

        for i in 0..5 {
            store
                .append_audit(&AuditEvent {
                    timestamp: Utc::now(),
                    kind: AuditKind::CommandExecuted,
                    details: serde_json::json!({ "seq": i }),
                })
                .await
                .unwrap();
        }

        let recent = store.recent_audit(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].details["seq"], 4);
    }

    #[tokio::test]
    async fn test_concurrent_writes_all_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let store = std::sync::Arc::new(FileStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let session = Session::new(
                    format!("s{i}"),
                    "igor",
                    SessionOrigin::default(),
                );
                store.upsert_session(&session).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_sessions().await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let store = FileStore::open(&path).await.unwrap();
        assert!(store.health_check().await.is_ok());

        fs::remove_file(&path).await.unwrap();
        assert!(store.health_check().await.is_err());
    }
}
