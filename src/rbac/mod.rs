//! Authorization engine for cryptgate
//!
//! Answers "can role R perform action A on animatronic X" over the persisted
//! role registry. Role definitions change rarely, so the engine keeps a
//! snapshot cache with a short time-to-live and an explicit invalidation
//! hook; tests control staleness through both.
//!
//! Unknown roles and permissions evaluate to `false`, never an error -
//! absence of proof is treated as absence of permission.

mod types;

pub use types::{validate_role_graph, Permission, Role, RoleValidation};
pub(crate) use types::pattern_matches;

use crate::store::GatewayStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

/// Default cache time-to-live for the role registry
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Cached snapshot of the role registry
struct RegistryCache {
    roles: HashMap<String, Role>,
    loaded_at: Option<Instant>,
}

/// Role-based authorization engine with a TTL registry cache
pub struct RbacEngine {
    store: Arc<dyn GatewayStore>,
    cache: RwLock<RegistryCache>,
    ttl: Duration,
}

impl RbacEngine {
    /// Create an engine over the given store with the default cache TTL
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self::with_ttl(store, DEFAULT_CACHE_TTL)
    }

    /// Create an engine with an explicit cache TTL
    pub fn with_ttl(store: Arc<dyn GatewayStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: RwLock::new(RegistryCache {
                roles: HashMap::new(),
                loaded_at: None,
            }),
            ttl,
        }
    }

    /// Drop the cached registry so the next check reloads from the store.
    /// Call after any role or permission change.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.loaded_at = None;
    }

    /// Current registry snapshot, refreshing from the store when stale.
    /// A store failure serves the stale snapshot rather than denying
    /// everything mid-flight; the staleness window is bounded by the TTL.
    async fn snapshot(&self) -> HashMap<String, Role> {
        {
            let cache = self.cache.read().await;
            if let Some(loaded_at) = cache.loaded_at {
                if loaded_at.elapsed() < self.ttl {
                    return cache.roles.clone();
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(loaded_at) = cache.loaded_at {
            if loaded_at.elapsed() < self.ttl {
                return cache.roles.clone();
            }
        }

        match self.store.list_roles().await {
            Ok(roles) => {
                cache.roles = roles.into_iter().map(|r| (r.id.clone(), r)).collect();
                cache.loaded_at = Some(Instant::now());
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh role registry, serving stale snapshot");
            }
        }

        cache.roles.clone()
    }

    /// Look up a role definition by id
    pub async fn role(&self, role_id: &str) -> Option<Role> {
        self.snapshot().await.get(role_id).cloned()
    }

    /// Whether the role's effective permission set contains the permission
    pub async fn has_permission(&self, role_id: &str, permission: Permission) -> bool {
        let roles = self.snapshot().await;
        types::effective_permissions(&roles, role_id).contains(&permission)
    }

    /// Whether the role's effective access patterns cover the animatronic
    pub async fn has_resource_access(&self, role_id: &str, resource_id: &str) -> bool {
        let roles = self.snapshot().await;
        types::effective_resource_access(&roles, role_id)
            .iter()
            .any(|pattern| types::pattern_matches(pattern, resource_id))
    }

    /// The single authorization predicate every protected operation passes:
    /// permission held AND resource accessible
    pub async fn can_perform_action(
        &self,
        role_id: &str,
        resource_id: &str,
        permission: Permission,
    ) -> bool {
        let roles = self.snapshot().await;
        types::effective_permissions(&roles, role_id).contains(&permission)
            && types::effective_resource_access(&roles, role_id)
                .iter()
                .any(|pattern| types::pattern_matches(pattern, resource_id))
    }

    /// Effective permission set for caller-facing authorization summaries
    pub async fn effective_permissions(&self, role_id: &str) -> HashSet<Permission> {
        let roles = self.snapshot().await;
        types::effective_permissions(&roles, role_id)
    }

    /// Effective resource access patterns for caller-facing summaries
    pub async fn effective_resource_access(&self, role_id: &str) -> HashSet<String> {
        let roles = self.snapshot().await;
        types::effective_resource_access(&roles, role_id)
    }

    /// Validate a single role against the loaded registry: existence plus
    /// inheritance integrity (unknown parents, cycles)
    pub async fn validate_role(&self, role_id: &str) -> RoleValidation {
        let roles = self.snapshot().await;

        if !roles.contains_key(role_id) {
            return RoleValidation {
                valid: false,
                issues: vec![format!("Unknown role: {}", role_id)],
            };
        }

        // Restrict graph validation to issues reachable from this role
        let mut reachable: HashMap<String, Role> = HashMap::new();
        let mut stack = vec![role_id.to_string()];
        while let Some(id) = stack.pop() {
            if reachable.contains_key(&id) {
                continue;
            }
            if let Some(role) = roles.get(&id) {
                stack.extend(role.inherits.iter().cloned());
                reachable.insert(id, role.clone());
            }
        }
        let issues = types::validate_role_graph(&reachable);
        RoleValidation {
            valid: issues.is_empty(),
            issues,
        }
    }
}
