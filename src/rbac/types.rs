//! Role and permission types for cryptgate RBAC
//!
//! Provides:
//! - Permission enum covering the gateway's action vocabulary
//! - Role struct bundling permissions, resource access, and inheritance
//! - Validation result for role configuration checks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Actions a role can be granted on an animatronic
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read status, history, and telemetry summaries
    View,
    /// Trigger scenes and movement sequences
    Control,
    /// Change controller configuration
    Configure,
    /// Dispatch shell commands through the gateway
    Ssh,
    /// Administrative access (user/role management, system-wide history)
    Admin,
    /// Operate audio playback on the controller
    Audio,
    /// Stream raw telemetry from the controller
    Telemetry,
}

impl Permission {
    /// All permissions in the vocabulary
    pub fn all() -> HashSet<Permission> {
        [
            Permission::View,
            Permission::Control,
            Permission::Configure,
            Permission::Ssh,
            Permission::Admin,
            Permission::Audio,
            Permission::Telemetry,
        ]
        .into_iter()
        .collect()
    }

    /// Parse a permission from its config/wire form
    pub fn parse(s: &str) -> Option<Permission> {
        match s.to_lowercase().as_str() {
            "view" => Some(Permission::View),
            "control" => Some(Permission::Control),
            "configure" => Some(Permission::Configure),
            "ssh" => Some(Permission::Ssh),
            "admin" => Some(Permission::Admin),
            "audio" => Some(Permission::Audio),
            "telemetry" => Some(Permission::Telemetry),
            _ => None,
        }
    }

    /// Parse multiple permissions from a list of strings
    pub fn parse_many<S: AsRef<str>>(items: &[S]) -> Result<HashSet<Permission>, String> {
        let mut permissions = HashSet::new();
        for item in items {
            let s = item.as_ref().trim();
            if s.is_empty() {
                continue;
            }
            match Permission::parse(s) {
                Some(p) => {
                    permissions.insert(p);
                }
                None => return Err(format!("Unknown permission: {}", s)),
            }
        }
        Ok(permissions)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::View => write!(f, "view"),
            Permission::Control => write!(f, "control"),
            Permission::Configure => write!(f, "configure"),
            Permission::Ssh => write!(f, "ssh"),
            Permission::Admin => write!(f, "admin"),
            Permission::Audio => write!(f, "audio"),
            Permission::Telemetry => write!(f, "telemetry"),
        }
    }
}

/// A named bundle of permissions and resource access, optionally inheriting
/// from other roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Stable identifier
    pub id: String,
    /// Human-readable name (e.g. "operator", "maintenance")
    pub name: String,
    /// Seniority; higher values outrank lower ones
    pub priority: i32,
    /// Permissions granted directly by this role
    pub permissions: HashSet<Permission>,
    /// Animatronic id patterns this role can touch (glob patterns, "*" for
    /// all). An empty list grants access to nothing.
    #[serde(default)]
    pub resource_access: Vec<String>,
    /// Role ids whose permissions and access this role inherits transitively
    #[serde(default)]
    pub inherits: Vec<String>,
    /// When this role was created
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Create a new role with the given name, priority, and permissions
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        priority: i32,
        permissions: HashSet<Permission>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            permissions,
            resource_access: Vec::new(),
            inherits: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the resource access patterns
    pub fn with_resource_access(mut self, patterns: Vec<String>) -> Self {
        self.resource_access = patterns;
        self
    }

    /// Set the inherited role ids
    pub fn with_inherits(mut self, inherits: Vec<String>) -> Self {
        self.inherits = inherits;
        self
    }
}

/// Outcome of validating a role's configuration
#[derive(Debug, Clone, Serialize)]
pub struct RoleValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Check if an animatronic id matches an access pattern (glob-style)
pub(crate) fn pattern_matches(pattern: &str, resource_id: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Ok(glob) = glob::Pattern::new(pattern) {
        glob.matches(resource_id)
    } else {
        pattern == resource_id
    }
}

/// Effective permission set: own permissions plus the transitive union over
/// inheritance. Unknown inherited roles are skipped; cycles are broken by the
/// visited set.
pub(crate) fn effective_permissions(
    roles: &HashMap<String, Role>,
    role_id: &str,
) -> HashSet<Permission> {
    let mut out = HashSet::new();
    let mut visited = HashSet::new();
    collect(roles, role_id, &mut visited, &mut |role| {
        out.extend(role.permissions.iter().copied());
    });
    out
}

/// Effective resource access patterns, transitive over inheritance
pub(crate) fn effective_resource_access(
    roles: &HashMap<String, Role>,
    role_id: &str,
) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut visited = HashSet::new();
    collect(roles, role_id, &mut visited, &mut |role| {
        out.extend(role.resource_access.iter().cloned());
    });
    out
}

fn collect<'a, F: FnMut(&'a Role)>(
    roles: &'a HashMap<String, Role>,
    role_id: &str,
    visited: &mut HashSet<String>,
    f: &mut F,
) {
    if !visited.insert(role_id.to_string()) {
        return;
    }
    let Some(role) = roles.get(role_id) else {
        return;
    };
    f(role);
    for parent in &role.inherits {
        collect(roles, parent, visited, f);
    }
}

/// Validate the whole role graph: unknown inherited roles and inheritance
/// cycles are configuration errors that must be caught at load time.
pub fn validate_role_graph(roles: &HashMap<String, Role>) -> Vec<String> {
    let mut issues = Vec::new();

    for (id, role) in roles {
        for parent in &role.inherits {
            if !roles.contains_key(parent) {
                issues.push(format!("Role '{}' inherits unknown role '{}'", id, parent));
            }
        }
    }

    // Cycle detection with an explicit path set per starting role
    for id in roles.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = find_cycle(roles, id, &mut path) {
            issues.push(format!("Role inheritance cycle: {}", cycle.join(" -> ")));
            break; // one report is enough to fail the load
        }
    }

    issues.sort();
    issues.dedup();
    issues
}

fn find_cycle(
    roles: &HashMap<String, Role>,
    role_id: &str,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    if path.iter().any(|p| p == role_id) {
        let mut cycle = path.clone();
        cycle.push(role_id.to_string());
        return Some(cycle);
    }
    let role = roles.get(role_id)?;
    path.push(role_id.to_string());
    for parent in &role.inherits {
        if let Some(cycle) = find_cycle(roles, parent, path) {
            return Some(cycle);
        }
    }
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_map(roles: Vec<Role>) -> HashMap<String, Role> {
        roles.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[test]
    fn test_permission_parsing() {
        assert_eq!(Permission::parse("ssh"), Some(Permission::Ssh));
        assert_eq!(Permission::parse("ADMIN"), Some(Permission::Admin));
        assert_eq!(Permission::parse("fly"), None);
    }

    #[test]
    fn test_parse_many_rejects_unknown() {
        let parsed = Permission::parse_many(&["view", "control"]).unwrap();
        assert!(parsed.contains(&Permission::View));
        assert!(parsed.contains(&Permission::Control));
        assert!(Permission::parse_many(&["view", "levitate"]).is_err());
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("*", "orlok"));
        assert!(pattern_matches("orlok", "orlok"));
        assert!(pattern_matches("crypt-*", "crypt-keeper"));
        assert!(!pattern_matches("orlok", "coffin"));
    }

    #[test]
    fn test_effective_permissions_transitive() {
        let viewer = Role::new("viewer", "viewer", 10, [Permission::View].into_iter().collect());
        let operator = Role::new(
            "operator",
            "operator",
            50,
            [Permission::Control].into_iter().collect(),
        )
        .with_inherits(vec!["viewer".to_string()]);
        let maintenance = Role::new(
            "maintenance",
            "maintenance",
            80,
            [Permission::Ssh].into_iter().collect(),
        )
        .with_inherits(vec!["operator".to_string()]);

        let roles = role_map(vec![viewer, operator, maintenance]);
        let effective = effective_permissions(&roles, "maintenance");
        assert!(effective.contains(&Permission::Ssh));
        assert!(effective.contains(&Permission::Control));
        assert!(effective.contains(&Permission::View));
    }

    #[test]
    fn test_effective_permissions_survives_cycle() {
        let a = Role::new("a", "a", 1, [Permission::View].into_iter().collect())
            .with_inherits(vec!["b".to_string()]);
        let b = Role::new("b", "b", 1, [Permission::Control].into_iter().collect())
            .with_inherits(vec!["a".to_string()]);

        let roles = role_map(vec![a, b]);
        let effective = effective_permissions(&roles, "a");
        assert!(effective.contains(&Permission::View));
        assert!(effective.contains(&Permission::Control));
    }

    #[test]
    fn test_validate_role_graph_detects_cycle() {
        let a = Role::new("a", "a", 1, HashSet::new()).with_inherits(vec!["b".to_string()]);
        let b = Role::new("b", "b", 1, HashSet::new()).with_inherits(vec!["a".to_string()]);
        let issues = validate_role_graph(&role_map(vec![a, b]));
        assert!(issues.iter().any(|i| i.contains("cycle")));
    }

    #[test]
    fn test_validate_role_graph_detects_unknown_parent() {
        let a = Role::new("a", "a", 1, HashSet::new()).with_inherits(vec!["ghost".to_string()]);
        let issues = validate_role_graph(&role_map(vec![a]));
        assert!(issues.iter().any(|i| i.contains("unknown role 'ghost'")));
    }

    #[test]
    fn test_validate_role_graph_clean() {
        let viewer = Role::new("viewer", "viewer", 10, HashSet::new());
        let operator =
            Role::new("operator", "operator", 50, HashSet::new()).with_inherits(vec![
                "viewer".to_string(),
            ]);
        assert!(validate_role_graph(&role_map(vec![viewer, operator])).is_empty());
    }
}
