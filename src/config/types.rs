//! Raw configuration types for TOML parsing

use super::*;
use crate::gateway::{PolicyTier, TierMode};
use crate::rbac::{Permission, Role};
use crate::{Animatronic, OperationalStatus, SshCredentials};
use serde::Deserialize;

/// Raw configuration as parsed from TOML
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub auth: Option<RawAuthConfig>,
    pub storage: Option<RawStorageConfig>,
    pub logging: Option<RawLoggingConfig>,
    pub audit: Option<RawAuditConfig>,
    pub gateway: Option<RawGatewayConfig>,
    #[serde(default)]
    pub roles: Vec<RawRole>,
    #[serde(default)]
    pub animatronics: Vec<RawAnimatronic>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawAuthConfig {
    pub token_secret: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub access_ttl_minutes: Option<i64>,
    pub refresh_ttl_days: Option<i64>,
    pub session_idle_timeout_minutes: Option<i64>,
}

impl TryFrom<RawAuthConfig> for AuthConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAuthConfig) -> Result<Self, Self::Error> {
        // The file value wins; the environment is the fallback so that
        // deployments can keep the secret out of the config file entirely.
        let secret = raw
            .token_secret
            .or_else(|| std::env::var(TOKEN_SECRET_ENV).ok())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "No token secret: set [auth].token_secret or the {} environment variable",
                    TOKEN_SECRET_ENV
                ))
            })?;
        if secret.len() < 32 {
            return Err(ConfigError::Invalid(
                "Token secret must be at least 32 bytes".to_string(),
            ));
        }

        let access_ttl_minutes = raw.access_ttl_minutes.unwrap_or(15);
        let refresh_ttl_days = raw.refresh_ttl_days.unwrap_or(7);
        if access_ttl_minutes <= 0 || refresh_ttl_days <= 0 {
            return Err(ConfigError::Invalid(
                "Token lifetimes must be positive".to_string(),
            ));
        }

        Ok(Self {
            token_secret: SecretString::from(secret),
            issuer: raw.issuer.unwrap_or_else(|| "cryptgate".to_string()),
            audience: raw
                .audience
                .unwrap_or_else(|| "cryptgate-clients".to_string()),
            access_ttl: chrono::Duration::minutes(access_ttl_minutes),
            refresh_ttl: chrono::Duration::days(refresh_ttl_days),
            session_idle_timeout: chrono::Duration::minutes(
                raw.session_idle_timeout_minutes.unwrap_or(24 * 60),
            ),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawStorageConfig {
    pub backend: Option<String>,
    pub path: Option<String>,
}

impl TryFrom<RawStorageConfig> for StorageConfig {
    type Error = ConfigError;

    fn try_from(raw: RawStorageConfig) -> Result<Self, Self::Error> {
        let backend = match raw.backend.as_deref() {
            Some("file") | None => StorageBackendType::File,
            Some("memory") => StorageBackendType::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown storage backend: {}",
                    other
                )))
            }
        };

        let path = raw.path.map(expand_tilde);

        Ok(Self { backend, path })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl From<RawLoggingConfig> for LoggingConfig {
    fn from(raw: RawLoggingConfig) -> Self {
        Self {
            level: raw.level.unwrap_or_else(|| "info".to_string()),
            format: match raw.format.as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawAuditConfig {
    pub max_events: Option<usize>,
}

impl From<RawAuditConfig> for AuditConfig {
    fn from(raw: RawAuditConfig) -> Self {
        Self {
            max_events: raw.max_events.unwrap_or(10_000),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawGatewayConfig {
    pub default_timeout_secs: Option<u64>,
    pub max_timeout_secs: Option<u64>,
    pub max_batch: Option<usize>,
    pub history_capacity: Option<usize>,
    #[serde(default)]
    pub tiers: Vec<RawPolicyTier>,
    pub allow_prefixes: Option<Vec<String>>,
}

impl TryFrom<RawGatewayConfig> for GatewayConfig {
    type Error = ConfigError;

    fn try_from(raw: RawGatewayConfig) -> Result<Self, Self::Error> {
        let default_timeout_secs = raw.default_timeout_secs.unwrap_or(30);
        let max_timeout_secs = raw.max_timeout_secs.unwrap_or(300);
        if default_timeout_secs == 0 || max_timeout_secs < default_timeout_secs {
            return Err(ConfigError::Invalid(
                "Gateway timeouts must be positive and max >= default".to_string(),
            ));
        }

        let tiers = raw
            .tiers
            .into_iter()
            .map(|t| t.try_into())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            default_timeout_secs,
            max_timeout_secs,
            max_batch: raw.max_batch.unwrap_or(10),
            history_capacity: raw.history_capacity.unwrap_or(500),
            tiers,
            allow_prefixes: raw.allow_prefixes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RawPolicyTier {
    pub name: String,
    pub min_priority: i32,
    pub mode: String,
}

impl TryFrom<RawPolicyTier> for PolicyTier {
    type Error = ConfigError;

    fn try_from(raw: RawPolicyTier) -> Result<Self, Self::Error> {
        let mode = match raw.mode.as_str() {
            "deny_list_only" => TierMode::DenyListOnly,
            "allow_then_deny" => TierMode::AllowListThenDenyList,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown tier mode '{}' for tier '{}'",
                    other, raw.name
                )))
            }
        };

        Ok(Self {
            name: raw.name,
            min_priority: raw.min_priority,
            mode,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RawRole {
    pub id: String,
    pub name: Option<String>,
    pub priority: i32,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub resource_access: Vec<String>,
    #[serde(default)]
    pub inherits: Vec<String>,
}

impl TryFrom<RawRole> for Role {
    type Error = ConfigError;

    fn try_from(raw: RawRole) -> Result<Self, Self::Error> {
        let permissions = Permission::parse_many(&raw.permissions).map_err(|e| {
            ConfigError::Invalid(format!("Role '{}': {}", raw.id, e))
        })?;

        let name = raw.name.unwrap_or_else(|| raw.id.clone());
        Ok(Role::new(raw.id, name, raw.priority, permissions)
            .with_resource_access(raw.resource_access)
            .with_inherits(raw.inherits))
    }
}

#[derive(Debug, Deserialize)]
pub struct RawAnimatronic {
    pub id: String,
    pub name: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub status: Option<String>,
    pub ssh: Option<RawSshCredentials>,
}

#[derive(Debug, Deserialize)]
pub struct RawSshCredentials {
    pub user: String,
    pub keyfile: Option<String>,
}

impl TryFrom<RawAnimatronic> for Animatronic {
    type Error = ConfigError;

    fn try_from(raw: RawAnimatronic) -> Result<Self, Self::Error> {
        let status = match raw.status.as_deref() {
            Some(s) => OperationalStatus::parse(s).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Unknown status '{}' for animatronic '{}'",
                    s, raw.id
                ))
            })?,
            None => OperationalStatus::NotConfigured,
        };

        Ok(Self {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            host: raw.host,
            port: raw.port.unwrap_or(22),
            status,
            ssh: raw.ssh.map(|s| SshCredentials {
                user: s.user,
                keyfile: s.keyfile.map(expand_tilde),
            }),
        })
    }
}

/// Expand a leading `~/` to the user's home directory
fn expand_tilde(p: String) -> PathBuf {
    if let Some(rest) = p.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        PathBuf::from(p)
    }
}
