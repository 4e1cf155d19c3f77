//! Command gateway for cryptgate
//!
//! Validates a requested command against the caller's token and role,
//! resolves per-resource connection credentials, dispatches over the remote
//! execution channel with a timeout, and records the outcome in a bounded
//! history plus the audit log.
//!
//! The pipeline is one ordered object - token, permission, command content,
//! resource status, dispatch - short-circuiting on the first failure, so the
//! contract is mechanically enforceable and each stage unit-testable.

mod executor;
mod history;
mod policy;

pub use executor::{ExecutionResult, HostTarget, RemoteExecutor, SshExecutor};
pub use history::{CommandHistory, ExecutionRecord, DEFAULT_HISTORY_CAPACITY};
pub use policy::{CommandPolicy, CommandVerdict, PolicyTier, TierMode};

use crate::audit::{AuditKind, AuditLog};
use crate::auth::{AuthError, AuthService, Claims};
use crate::rbac::{pattern_matches, Permission, RbacEngine, Role};
use crate::{Animatronic, OperationalStatus};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default per-dispatch timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
/// Ceiling a caller-specified timeout is clamped to
pub const MAX_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
/// Largest accepted batch
pub const DEFAULT_MAX_BATCH: usize = 10;
/// Budget for the connectivity probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Identity recorded for system-initiated health checks
const SYSTEM_USER: &str = "system";

/// Gateway-level errors: the gateway refused to run the command.
///
/// Remote-side failures are not here - they come back as a failed
/// `ExecutionResult`.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Role '{0}' lacks the required permission")]
    PermissionDenied(String),

    #[error("Role '{role}' has no access to animatronic '{resource}'")]
    ResourceAccessDenied { role: String, resource: String },

    #[error("Command blocked: {reason}")]
    CommandBlocked { reason: String },

    #[error("Unknown animatronic: {0}")]
    ResourceUnknown(String),

    #[error("Animatronic '{resource}' is {status}, not operational")]
    ResourceNotOperational {
        resource: String,
        status: OperationalStatus,
    },

    #[error("No connection credentials configured for animatronic '{0}'")]
    CredentialsMissing(String),

    #[error("Batch of {got} commands exceeds the limit of {max}")]
    BatchTooLarge { got: usize, max: usize },
}

impl GatewayError {
    /// Stable machine-readable code for the serving layer
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Auth(e) => e.error_code(),
            GatewayError::PermissionDenied(_) => "INSUFFICIENT_PERMISSIONS",
            GatewayError::ResourceAccessDenied { .. } => "ANIMATRONIC_ACCESS_DENIED",
            GatewayError::CommandBlocked { .. } => "COMMAND_BLOCKED",
            GatewayError::ResourceUnknown(_) => "UNKNOWN_ANIMATRONIC",
            GatewayError::ResourceNotOperational { .. } => "ANIMATRONIC_NOT_OPERATIONAL",
            GatewayError::CredentialsMissing(_) => "CREDENTIALS_MISSING",
            GatewayError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
        }
    }
}

/// Options for a single execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Caller override, clamped to the gateway ceiling
    pub timeout: Option<Duration>,
}

/// Options for a batch execution
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub timeout: Option<Duration>,
    /// Stop dispatching after the first command whose result is a failure
    pub stop_on_failure: bool,
}

/// The command gateway
pub struct CommandGateway {
    auth: Arc<AuthService>,
    rbac: Arc<RbacEngine>,
    executor: Arc<dyn RemoteExecutor>,
    audit: Arc<AuditLog>,
    resources: HashMap<String, Animatronic>,
    history: CommandHistory,
    policy: CommandPolicy,
    default_timeout: Duration,
    max_timeout: Duration,
    max_batch: usize,
}

impl CommandGateway {
    pub fn new(
        auth: Arc<AuthService>,
        rbac: Arc<RbacEngine>,
        executor: Arc<dyn RemoteExecutor>,
        audit: Arc<AuditLog>,
        resources: Vec<Animatronic>,
    ) -> Self {
        Self {
            auth,
            rbac,
            executor,
            audit,
            resources: resources.into_iter().map(|r| (r.id.clone(), r)).collect(),
            history: CommandHistory::default(),
            policy: CommandPolicy::default(),
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_timeout: MAX_COMMAND_TIMEOUT,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Replace the command validation policy
    pub fn with_policy(mut self, policy: CommandPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set history ring capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = CommandHistory::new(capacity);
        self
    }

    /// Set the default and maximum dispatch timeouts
    pub fn with_timeouts(mut self, default: Duration, max: Duration) -> Self {
        self.default_timeout = default;
        self.max_timeout = max;
        self
    }

    /// Set the batch size cap
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }

    /// Run one command through the full pipeline.
    ///
    /// A returned `ExecutionResult` with `success == false` means the remote
    /// side failed (nonzero exit, unreachable, timeout); a `GatewayError`
    /// means the gateway refused before dispatching.
    pub async fn execute_command(
        &self,
        access_token: &str,
        resource_id: &str,
        command: &str,
        opts: ExecuteOptions,
    ) -> Result<ExecutionResult, GatewayError> {
        let (claims, role) = self.authorize(access_token, resource_id).await?;
        self.check_command(command, &role, &claims).await?;
        let resource = self.operational_resource(resource_id).await?;

        let timeout = self.clamp_timeout(opts.timeout);
        let result = self
            .dispatch(&claims.sub, &resource, command, timeout)
            .await?;
        Ok(result)
    }

    /// Run a batch of commands against one resource, strictly sequentially.
    ///
    /// All commands are validated before any is dispatched; `stop_on_failure`
    /// cuts the batch short, so later commands are never sent.
    pub async fn execute_batch(
        &self,
        access_token: &str,
        resource_id: &str,
        commands: &[String],
        opts: BatchOptions,
    ) -> Result<Vec<ExecutionResult>, GatewayError> {
        if commands.len() > self.max_batch {
            return Err(GatewayError::BatchTooLarge {
                got: commands.len(),
                max: self.max_batch,
            });
        }

        let (claims, role) = self.authorize(access_token, resource_id).await?;
        for command in commands {
            self.check_command(command, &role, &claims).await?;
        }
        let resource = self.operational_resource(resource_id).await?;

        let timeout = self.clamp_timeout(opts.timeout);
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self
                .dispatch(&claims.sub, &resource, command, timeout)
                .await?;
            let failed = !result.success;
            results.push(result);
            if failed && opts.stop_on_failure {
                break;
            }
        }
        Ok(results)
    }

    /// Classify a command for a role without executing anything
    pub async fn validate_command(&self, command: &str, role_id: &str) -> CommandVerdict {
        match self.rbac.role(role_id).await {
            Some(role) => self.policy.validate(command, &role),
            None => CommandVerdict {
                valid: false,
                reason: Some(format!("Unknown role: {}", role_id)),
            },
        }
    }

    /// Authenticated connectivity test: permission-checked, then the fixed
    /// probe. Status is deliberately not checked - health displays need to
    /// probe maintenance hosts too.
    pub async fn test_connectivity(
        &self,
        access_token: &str,
        resource_id: &str,
    ) -> Result<ExecutionResult, GatewayError> {
        let (_claims, _role) = self.authorize(access_token, resource_id).await?;
        self.probe(resource_id).await
    }

    /// Internal fast-path for system-initiated health checks; carries no
    /// user identity and skips the authorization pipeline
    pub async fn probe(&self, resource_id: &str) -> Result<ExecutionResult, GatewayError> {
        let resource = self
            .resources
            .get(resource_id)
            .ok_or_else(|| GatewayError::ResourceUnknown(resource_id.to_string()))?;

        self.dispatch(SYSTEM_USER, resource, "echo cryptgate-ping", PROBE_TIMEOUT)
            .await
    }

    /// One user's command history, most recent first
    pub fn command_history(&self, user_id: &str, limit: usize) -> Vec<ExecutionRecord> {
        self.history.for_user(user_id, limit)
    }

    /// Unscoped history. The serving layer restricts this to the most senior
    /// role; the gateway does not enforce that itself.
    pub fn system_command_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.history.recent(limit)
    }

    /// Known animatronic registry
    pub fn resources(&self) -> impl Iterator<Item = &Animatronic> {
        self.resources.values()
    }

    // ==================== Pipeline stages ====================

    /// Stages 1-2: token verification, then permission and resource access
    async fn authorize(
        &self,
        access_token: &str,
        resource_id: &str,
    ) -> Result<(Claims, Role), GatewayError> {
        let claims = self.auth.verify_access_token(access_token).await?;
        let role_id = claims
            .user
            .as_ref()
            .map(|u| u.role.clone())
            .unwrap_or_default();

        let role = match self.rbac.role(&role_id).await {
            Some(role) => role,
            None => {
                self.audit_denied(&claims, resource_id, "unknown role").await;
                return Err(GatewayError::PermissionDenied(role_id));
            }
        };

        if !self.rbac.has_permission(&role.id, Permission::Ssh).await {
            self.audit_denied(&claims, resource_id, "missing ssh permission")
                .await;
            return Err(GatewayError::PermissionDenied(role.id));
        }

        // Role-level access, or a per-user grant embedded at token minting
        let role_access = self.rbac.has_resource_access(&role.id, resource_id).await;
        let grant_access = claims.grants.iter().any(|(pattern, perms)| {
            pattern_matches(pattern, resource_id) && perms.contains(&Permission::Ssh)
        });
        if !role_access && !grant_access {
            self.audit_denied(&claims, resource_id, "no resource access")
                .await;
            return Err(GatewayError::ResourceAccessDenied {
                role: role.id,
                resource: resource_id.to_string(),
            });
        }

        Ok((claims, role))
    }

    /// Stage 3: command-content validation
    async fn check_command(
        &self,
        command: &str,
        role: &Role,
        claims: &Claims,
    ) -> Result<(), GatewayError> {
        let verdict = self.policy.validate(command, role);
        if verdict.valid {
            return Ok(());
        }
        let reason = verdict.reason.unwrap_or_else(|| "blocked".to_string());
        self.audit
            .record(
                AuditKind::CommandBlocked,
                json!({
                    "user_id": claims.sub,
                    "role": role.id,
                    "command": command,
                    "reason": reason,
                }),
            )
            .await;
        Err(GatewayError::CommandBlocked { reason })
    }

    /// Stage 4: resource lookup and operational-status gate
    async fn operational_resource(&self, resource_id: &str) -> Result<Animatronic, GatewayError> {
        let resource = self
            .resources
            .get(resource_id)
            .ok_or_else(|| GatewayError::ResourceUnknown(resource_id.to_string()))?;

        if !resource.status.allows_dispatch() {
            return Err(GatewayError::ResourceNotOperational {
                resource: resource_id.to_string(),
                status: resource.status,
            });
        }

        Ok(resource.clone())
    }

    /// Stages 5-6: credential resolution, dispatch, and recording
    async fn dispatch(
        &self,
        user_id: &str,
        resource: &Animatronic,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, GatewayError> {
        let ssh = resource
            .ssh
            .as_ref()
            .ok_or_else(|| GatewayError::CredentialsMissing(resource.id.clone()))?;

        let target = HostTarget {
            host: resource.host.clone(),
            port: resource.port,
            user: ssh.user.clone(),
            keyfile: ssh.keyfile.clone(),
        };

        let result = self.executor.run(&target, command, timeout).await;

        let record = ExecutionRecord {
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            resource_id: resource.id.clone(),
            host: resource.host.clone(),
            command: command.to_string(),
            exit_code: result.exit_code,
            duration_ms: result.duration_ms,
            success: result.success,
        };
        self.history.push(record);

        self.audit
            .record(
                AuditKind::CommandExecuted,
                json!({
                    "user_id": user_id,
                    "resource_id": resource.id,
                    "command": command,
                    "success": result.success,
                    "exit_code": result.exit_code,
                    "duration_ms": result.duration_ms,
                }),
            )
            .await;

        info!(
            user = %user_id,
            resource = %resource.id,
            success = result.success,
            duration_ms = result.duration_ms,
            "Command dispatched"
        );

        Ok(result)
    }

    fn clamp_timeout(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or(self.default_timeout).min(self.max_timeout)
    }

    async fn audit_denied(&self, claims: &Claims, resource_id: &str, reason: &str) {
        self.audit
            .record(
                AuditKind::PermissionDenied,
                json!({
                    "user_id": claims.sub,
                    "resource_id": resource_id,
                    "reason": reason,
                }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{SessionOrigin, TokenSigner, User};
    use crate::rbac::Role;
    use crate::store::{GatewayStore, MemoryStore};
    use crate::SshCredentials;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use secrecy::SecretString;

    /// Scripted executor: fails any command containing "fail", records calls
    struct MockExecutor {
        calls: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl RemoteExecutor for MockExecutor {
        async fn run(
            &self,
            _target: &HostTarget,
            command: &str,
            _timeout: Duration,
        ) -> ExecutionResult {
            self.calls.lock().push(command.to_string());
            let fail = command.contains("fail");
            ExecutionResult {
                success: !fail,
                stdout: if fail { String::new() } else { "ok\n".to_string() },
                stderr: String::new(),
                exit_code: Some(if fail { 1 } else { 0 }),
                duration_ms: 5,
                error: fail.then(|| "remote command exited with 1".to_string()),
            }
        }
    }

    struct Fixture {
        gateway: CommandGateway,
        auth: Arc<AuthService>,
        executor: Arc<MockExecutor>,
        store: Arc<MemoryStore>,
    }

    fn animatronic(id: &str, status: OperationalStatus, with_creds: bool) -> Animatronic {
        Animatronic {
            id: id.to_string(),
            name: id.to_string(),
            host: format!("{}.crypt.local", id),
            port: 22,
            status,
            ssh: with_creds.then(|| SshCredentials {
                user: "pi".to_string(),
                keyfile: None,
            }),
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());

        let keeper = Role::new(
            "keeper",
            "keeper",
            100,
            [Permission::Ssh, Permission::Admin, Permission::View]
                .into_iter()
                .collect(),
        )
        .with_resource_access(vec!["*".to_string()]);
        let operator = Role::new(
            "operator",
            "operator",
            50,
            [Permission::View, Permission::Control, Permission::Ssh]
                .into_iter()
                .collect(),
        )
        .with_resource_access(vec!["orlok".to_string(), "coffin".to_string()]);
        let viewer = Role::new(
            "viewer",
            "viewer",
            10,
            [Permission::View].into_iter().collect(),
        )
        .with_resource_access(vec!["*".to_string()]);
        for role in [&keeper, &operator, &viewer] {
            store.upsert_role(role).await.unwrap();
        }

        for (name, role) in [("vlad", "keeper"), ("igor", "operator"), ("peep", "viewer")] {
            let hash = bcrypt::hash("graveyard-shift", 4).unwrap();
            store
                .upsert_user(&User::new(name, hash, role))
                .await
                .unwrap();
        }

        let rbac = Arc::new(RbacEngine::new(store.clone() as Arc<dyn GatewayStore>));
        let audit = Arc::new(AuditLog::new());
        let signer = TokenSigner::new(
            &SecretString::new("a-test-secret-of-reasonable-length".to_string()),
            "cryptgate",
            "cryptgate-clients",
            chrono::Duration::minutes(15),
            chrono::Duration::days(7),
        );
        let auth = Arc::new(AuthService::new(
            store.clone() as Arc<dyn GatewayStore>,
            rbac.clone(),
            signer,
            audit.clone(),
        ));

        let executor = Arc::new(MockExecutor::new());
        let gateway = CommandGateway::new(
            auth.clone(),
            rbac,
            executor.clone(),
            audit,
            vec![
                animatronic("orlok", OperationalStatus::Operational, true),
                animatronic("coffin", OperationalStatus::Maintenance, true),
                animatronic("pumpkinhead", OperationalStatus::Operational, true),
                animatronic("banshee", OperationalStatus::Operational, false),
            ],
        );

        Fixture {
            gateway,
            auth,
            executor,
            store,
        }
    }

    async fn login(fixture: &Fixture, username: &str) -> String {
        fixture
            .auth
            .authenticate(
                username,
                &SecretString::new("graveyard-shift".to_string()),
                SessionOrigin::default(),
            )
            .await
            .unwrap()
            .access_token
    }

    #[tokio::test]
    async fn test_execute_happy_path() {
        let f = fixture().await;
        let token = login(&f, "igor").await;

        let result = f
            .gateway
            .execute_command(&token, "orlok", "uptime", ExecuteOptions::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(f.executor.calls(), vec!["uptime".to_string()]);
        assert_eq!(f.gateway.system_command_history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_viewer_lacks_ssh_permission() {
        let f = fixture().await;
        let token = login(&f, "peep").await;

        let err = f
            .gateway
            .execute_command(&token, "orlok", "uptime", ExecuteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::PermissionDenied(_)));
        assert_eq!(err.error_code(), "INSUFFICIENT_PERMISSIONS");
        assert!(f.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_operator_denied_on_unlisted_resource() {
        let f = fixture().await;
        let token = login(&f, "igor").await;

        let err = f
            .gateway
            .execute_command(&token, "pumpkinhead", "uptime", ExecuteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::ResourceAccessDenied { .. }));
        assert_eq!(err.error_code(), "ANIMATRONIC_ACCESS_DENIED");
    }

    #[tokio::test]
    async fn test_blocked_command_never_dispatched() {
        let f = fixture().await;
        let token = login(&f, "igor").await;

        let err = f
            .gateway
            .execute_command(&token, "orlok", "sudo rm file", ExecuteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::CommandBlocked { .. }));
        assert!(f.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_maintenance_resource_refused_for_any_role() {
        let f = fixture().await;

        // Even the most senior role cannot dispatch to a non-operational host
        let token = login(&f, "vlad").await;
        let err = f
            .gateway
            .execute_command(&token, "coffin", "uptime", ExecuteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::ResourceNotOperational { .. }));
        assert_eq!(err.error_code(), "ANIMATRONIC_NOT_OPERATIONAL");
        assert!(f.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let f = fixture().await;
        let token = login(&f, "vlad").await;

        let err = f
            .gateway
            .execute_command(&token, "banshee", "uptime", ExecuteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::CredentialsMissing(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let f = fixture().await;
        let token = login(&f, "vlad").await;

        let err = f
            .gateway
            .execute_command(&token, "wolfman", "uptime", ExecuteOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::ResourceUnknown(_)));
    }

    #[tokio::test]
    async fn test_revoked_token_refused() {
        let f = fixture().await;
        let auth = f
            .auth
            .authenticate(
                "igor",
                &SecretString::new("graveyard-shift".to_string()),
                SessionOrigin::default(),
            )
            .await
            .unwrap();

        f.auth.logout(&auth.session_id).await;

        let err = f
            .gateway
            .execute_command(
                &auth.access_token,
                "orlok",
                "uptime",
                ExecuteOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Auth(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_batch_stop_on_failure() {
        let f = fixture().await;
        let token = login(&f, "igor").await;

        let commands = vec![
            "uptime".to_string(),
            "echo fail".to_string(),
            "hostname".to_string(),
        ];
        let results = f
            .gateway
            .execute_batch(
                &token,
                "orlok",
                &commands,
                BatchOptions {
                    timeout: None,
                    stop_on_failure: true,
                },
            )
            .await
            .unwrap();

        // Third command never dispatched
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(f.executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_continues_without_stop_on_failure() {
        let f = fixture().await;
        let token = login(&f, "igor").await;

        let commands = vec![
            "uptime".to_string(),
            "echo fail".to_string(),
            "hostname".to_string(),
        ];
        let results = f
            .gateway
            .execute_batch(&token, "orlok", &commands, BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_batch_with_blocked_command_dispatches_nothing() {
        let f = fixture().await;
        let token = login(&f, "igor").await;

        let commands = vec!["uptime".to_string(), "sudo reboot".to_string()];
        let err = f
            .gateway
            .execute_batch(&token, "orlok", &commands, BatchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::CommandBlocked { .. }));
        assert!(f.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_batch_too_large() {
        let f = fixture().await;
        let token = login(&f, "igor").await;

        let commands: Vec<String> = (0..11).map(|_| "uptime".to_string()).collect();
        let err = f
            .gateway
            .execute_batch(&token, "orlok", &commands, BatchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::BatchTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_per_user_history_scoping() {
        let f = fixture().await;
        let igor_token = login(&f, "igor").await;
        let vlad_token = login(&f, "vlad").await;

        f.gateway
            .execute_command(&igor_token, "orlok", "uptime", ExecuteOptions::default())
            .await
            .unwrap();
        f.gateway
            .execute_command(&vlad_token, "orlok", "hostname", ExecuteOptions::default())
            .await
            .unwrap();

        let igor = f.store.user_by_username("igor").await.unwrap().unwrap();
        let history = f.gateway.command_history(&igor.id, 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].command, "uptime");

        assert_eq!(f.gateway.system_command_history(10).len(), 2);
    }

    #[tokio::test]
    async fn test_probe_records_system_identity() {
        let f = fixture().await;

        let result = f.gateway.probe("orlok").await.unwrap();
        assert!(result.success);

        let history = f.gateway.system_command_history(10);
        assert_eq!(history[0].user_id, "system");
        assert_eq!(history[0].command, "echo cryptgate-ping");
    }

    #[tokio::test]
    async fn test_probe_works_on_maintenance_host() {
        let f = fixture().await;
        // Health displays probe non-operational hosts too
        assert!(f.gateway.probe("coffin").await.is_ok());
    }

    #[tokio::test]
    async fn test_connectivity_enforces_authorization() {
        let f = fixture().await;

        // viewer has no ssh permission
        let token = login(&f, "peep").await;
        let err = f.gateway.test_connectivity(&token, "orlok").await.unwrap_err();
        assert!(matches!(err, GatewayError::PermissionDenied(_)));
        assert!(f.executor.calls().is_empty());

        // operator has no access to pumpkinhead
        let token = login(&f, "igor").await;
        let err = f
            .gateway
            .test_connectivity(&token, "pumpkinhead")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ResourceAccessDenied { .. }));
        assert!(f.executor.calls().is_empty());

        // authorized caller may probe a maintenance host
        let result = f.gateway.test_connectivity(&token, "coffin").await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_validate_command_endpoint() {
        let f = fixture().await;

        let verdict = f.gateway.validate_command("rm -rf /", "keeper").await;
        assert!(!verdict.valid);

        let verdict = f.gateway.validate_command("uptime", "keeper").await;
        assert!(verdict.valid);

        let verdict = f.gateway.validate_command("uptime", "ghost-role").await;
        assert!(!verdict.valid);
    }
}
