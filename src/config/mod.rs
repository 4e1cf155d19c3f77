//! Configuration system for cryptgate
//!
//! Loads configuration from a TOML file with an environment-variable fallback
//! for the token signing secret. Raw TOML types convert into validated config
//! types; the role graph is checked at load time so a bad deployment fails at
//! startup, not on the first request.

mod types;

pub use types::*;

use crate::gateway::PolicyTier;
use crate::rbac::{validate_role_graph, Role};
use crate::Animatronic;
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Environment variable consulted when `[auth].token_secret` is absent
pub const TOKEN_SECRET_ENV: &str = "CRYPTGATE_TOKEN_SECRET";

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main cryptgate configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Token issuance and session settings
    pub auth: AuthConfig,
    /// Storage backend
    pub storage: StorageConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Audit retention
    pub audit: AuditConfig,
    /// Gateway dispatch settings
    pub gateway: GatewayConfig,
    /// Role definitions seeded into the store at startup
    pub roles: Vec<Role>,
    /// The animatronic fleet
    pub animatronics: Vec<Animatronic>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Self::from_raw(raw)
    }

    /// Convert from raw TOML config to validated config
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let auth = raw.auth.unwrap_or_default().try_into()?;
        let storage = raw.storage.unwrap_or_default().try_into()?;
        let logging = raw.logging.unwrap_or_default().into();
        let audit = raw.audit.unwrap_or_default().into();
        let gateway = raw.gateway.unwrap_or_default().try_into()?;

        let roles: Vec<Role> = raw
            .roles
            .into_iter()
            .map(|r| r.try_into())
            .collect::<Result<Vec<_>, _>>()?;

        // Unknown parents and inheritance cycles are load-time errors
        let by_id: HashMap<String, Role> =
            roles.iter().map(|r| (r.id.clone(), r.clone())).collect();
        let issues = validate_role_graph(&by_id);
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues.join("; ")));
        }

        let animatronics: Vec<Animatronic> = raw
            .animatronics
            .into_iter()
            .map(|a| a.try_into())
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = std::collections::HashSet::new();
        for a in &animatronics {
            if !seen.insert(&a.id) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate animatronic id: {}",
                    a.id
                )));
            }
        }

        Ok(Self {
            auth,
            storage,
            logging,
            audit,
            gateway,
            roles,
            animatronics,
        })
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cryptgate")
            .join("config.toml")
    }

    /// Get the default storage path
    pub fn default_storage_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cryptgate")
            .join("gateway.json")
    }
}

/// Token issuance and session settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC key for signing tokens
    pub token_secret: SecretString,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    /// Sessions idle longer than this are swept
    pub session_idle_timeout: chrono::Duration,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendType,
    /// Path for file storage
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::File,
            path: Some(Config::default_storage_path()),
        }
    }
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendType {
    /// JSON file with atomic saves
    File,
    /// In-memory, for tests and ephemeral deployments
    Memory,
}

/// Audit retention settings
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Events retained in memory and in the persisted store
    pub max_events: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { max_events: 10_000 }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Gateway dispatch settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    pub max_batch: usize,
    pub history_capacity: usize,
    /// Policy tiers, empty means the built-in two-tier default
    pub tiers: Vec<PolicyTier>,
    /// Allow-list override for restricted tiers
    pub allow_prefixes: Option<Vec<String>>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_timeout_secs: 300,
            max_batch: 10,
            history_capacity: 500,
            tiers: Vec::new(),
            allow_prefixes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Permission;
    use crate::OperationalStatus;
    use secrecy::ExposeSecret;

    const SECRET_LINE: &str =
        "token_secret = \"0123456789abcdef0123456789abcdef\"";

    fn full_toml() -> String {
        format!(
            r#"
[auth]
{SECRET_LINE}
issuer = "crypt"
access_ttl_minutes = 5

[storage]
backend = "file"
path = "/var/lib/cryptgate/gateway.json"

[logging]
level = "debug"
format = "json"

[audit]
max_events = 2000

[gateway]
default_timeout_secs = 20
max_timeout_secs = 120

[[gateway.tiers]]
name = "trusted"
min_priority = 100
mode = "deny_list_only"

[[gateway.tiers]]
name = "restricted"
min_priority = 0
mode = "allow_then_deny"

[[roles]]
id = "keeper"
priority = 100
permissions = ["admin", "ssh", "view", "control", "configure"]
resource_access = ["*"]

[[roles]]
id = "operator"
priority = 50
permissions = ["view", "control", "ssh"]
resource_access = ["orlok", "coffin"]

[[animatronics]]
id = "orlok"
host = "orlok.crypt.local"
status = "operational"

[animatronics.ssh]
user = "pi"
keyfile = "/etc/cryptgate/keys/orlok"

[[animatronics]]
id = "coffin"
host = "10.0.0.12"
port = 2222
status = "maintenance"
"#
        )
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(&full_toml()).unwrap();

        assert_eq!(config.auth.issuer, "crypt");
        assert_eq!(config.auth.access_ttl, chrono::Duration::minutes(5));
        assert_eq!(config.storage.backend, StorageBackendType::File);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.audit.max_events, 2000);
        assert_eq!(config.gateway.default_timeout_secs, 20);
        assert_eq!(config.gateway.tiers.len(), 2);
        assert_eq!(config.roles.len(), 2);
        assert!(config.roles[0].permissions.contains(&Permission::Admin));
        assert_eq!(config.animatronics.len(), 2);
        assert_eq!(config.animatronics[1].port, 2222);
        assert_eq!(
            config.animatronics[1].status,
            OperationalStatus::Maintenance
        );
        assert!(config.animatronics[1].ssh.is_none());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let toml = format!("[auth]\n{SECRET_LINE}\n");
        let config = Config::parse(&toml).unwrap();

        assert_eq!(config.auth.issuer, "cryptgate");
        assert_eq!(config.auth.access_ttl, chrono::Duration::minutes(15));
        assert_eq!(config.gateway.max_batch, 10);
        assert_eq!(config.audit.max_events, 10_000);
        assert!(config.roles.is_empty());
    }

    #[test]
    fn test_short_secret_rejected() {
        let toml = "[auth]\ntoken_secret = \"too-short\"\n";
        let err = Config::parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_permission_rejected() {
        let toml = format!(
            r#"
[auth]
{SECRET_LINE}

[[roles]]
id = "weird"
priority = 1
permissions = ["levitate"]
"#
        );
        let err = Config::parse(&toml).unwrap_err();
        assert!(err.to_string().contains("weird"));
    }

    #[test]
    fn test_inheritance_cycle_rejected() {
        let toml = format!(
            r#"
[auth]
{SECRET_LINE}

[[roles]]
id = "a"
priority = 1
inherits = ["b"]

[[roles]]
id = "b"
priority = 1
inherits = ["a"]
"#
        );
        let err = Config::parse(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let toml = format!(
            r#"
[auth]
{SECRET_LINE}

[[roles]]
id = "a"
priority = 1
inherits = ["ghost"]
"#
        );
        assert!(Config::parse(&toml).is_err());
    }

    #[test]
    fn test_duplicate_animatronic_rejected() {
        let toml = format!(
            r#"
[auth]
{SECRET_LINE}

[[animatronics]]
id = "orlok"
host = "a"

[[animatronics]]
id = "orlok"
host = "b"
"#
        );
        assert!(Config::parse(&toml).is_err());
    }

    #[test]
    fn test_bad_timeouts_rejected() {
        let toml = format!(
            "[auth]\n{SECRET_LINE}\n[gateway]\ndefault_timeout_secs = 60\nmax_timeout_secs = 10\n"
        );
        assert!(Config::parse(&toml).is_err());
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let toml = format!("[auth]\n{SECRET_LINE}\n");
        let config = Config::parse(&toml).unwrap();
        let debug = format!("{:?}", config.auth);
        assert!(!debug.contains(config.auth.token_secret.expose_secret()));
    }
}
