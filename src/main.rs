//! Cryptgate CLI - administration tool for the animatronic command gateway
//!
//! Run `cryptgate --help` for usage information.

use clap::{Parser, Subcommand};
use cryptgate::audit::AuditLog;
use cryptgate::auth::{AuthService, TokenSigner, User};
use cryptgate::config::{Config, LogFormat, StorageBackendType};
use cryptgate::gateway::{CommandGateway, CommandPolicy, RemoteExecutor, SshExecutor};
use cryptgate::rbac::RbacEngine;
use cryptgate::store::{FileStore, GatewayStore, MemoryStore};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "cryptgate",
    about = "Secure remote-access command gateway for animatronic controllers",
    version
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a password for manual user provisioning
    HashPassword {
        /// Password to hash (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,
    },

    /// Add a user to the gateway store
    AddUser {
        /// Login name
        username: String,

        /// Role id (must exist in the configured roles)
        #[arg(short, long)]
        role: String,

        /// Password (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,

        /// Extra per-user resource patterns (can be repeated)
        #[arg(short = 'a', long = "access")]
        resource_access: Vec<String>,
    },

    /// List users in the gateway store
    ListUsers {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Validate a configuration file and report what it defines
    ValidateConfig,

    /// Probe animatronic connectivity
    Check {
        /// Limit the probe to one animatronic
        animatronic: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    // hash-password needs no configuration at all
    if let Commands::HashPassword { password } = &cli.command {
        return hash_password(password.clone());
    }

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path).await?;

    match cli.command {
        Commands::HashPassword { .. } => unreachable!("handled above"),
        Commands::AddUser {
            username,
            role,
            password,
            resource_access,
        } => {
            add_user(config, username, role, password, resource_access).await?;
        }
        Commands::ListUsers { format } => {
            list_users(config, format).await?;
        }
        Commands::ValidateConfig => {
            validate_config(&config_path, config);
        }
        Commands::Check { animatronic } => {
            check_connectivity(config, animatronic).await?;
        }
    }

    Ok(())
}

/// Read a password from an argument or an interactive prompt
fn read_password(arg: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(p) = arg {
        return Ok(p);
    }
    eprint!("Enter password: ");
    io::stderr().flush()?;
    Ok(rpassword::read_password()?)
}

fn hash_password(arg: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let password = read_password(arg)?;
    let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)?;
    println!("{}", hash);
    Ok(())
}

/// Open the configured storage backend and seed role definitions into it
async fn init_store(config: &Config) -> Result<Arc<dyn GatewayStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn GatewayStore> = match config.storage.backend {
        StorageBackendType::File => {
            let path = config
                .storage
                .path
                .clone()
                .unwrap_or_else(Config::default_storage_path);
            Arc::new(FileStore::open_with_retention(&path, config.audit.max_events).await?)
        }
        StorageBackendType::Memory => Arc::new(MemoryStore::new()),
    };

    for role in &config.roles {
        store.upsert_role(role).await?;
    }

    Ok(store)
}

async fn add_user(
    config: Config,
    username: String,
    role: String,
    password: Option<String>,
    resource_access: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !config.roles.iter().any(|r| r.id == role) {
        return Err(format!("Unknown role: {}", role).into());
    }

    let store = init_store(&config).await?;
    if store.user_by_username(&username).await?.is_some() {
        return Err(format!("User already exists: {}", username).into());
    }

    let password = read_password(password)?;
    let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)?;

    let user = User::new(&username, hash, &role).with_resource_access(resource_access);
    store.upsert_user(&user).await?;

    info!(user = %username, role = %role, "User created");
    println!("Created user '{}' with role '{}'", username, role);
    Ok(())
}

async fn list_users(config: Config, format: String) -> Result<(), Box<dyn std::error::Error>> {
    let store = init_store(&config).await?;
    let users = store.list_users().await?;

    match format.as_str() {
        "json" => {
            let rows: Vec<serde_json::Value> = users
                .iter()
                .map(|u| {
                    serde_json::json!({
                        "id": u.id,
                        "username": u.username,
                        "role": u.role_id,
                        "enabled": u.enabled,
                        "last_login": u.last_login,
                        "created_at": u.created_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            println!(
                "{:<20} {:<14} {:<8} LAST LOGIN",
                "USERNAME", "ROLE", "ENABLED"
            );
            for u in &users {
                let last = u
                    .last_login
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<20} {:<14} {:<8} {}",
                    u.username, u.role_id, u.enabled, last
                );
            }
            println!("\n{} user(s)", users.len());
        }
    }

    Ok(())
}

fn validate_config(path: &std::path::Path, config: Config) {
    println!("{}: OK", path.display());
    println!("  roles:        {}", config.roles.len());
    for role in &config.roles {
        println!(
            "    {} (priority {}, {} permission(s), {} pattern(s))",
            role.id,
            role.priority,
            role.permissions.len(),
            role.resource_access.len()
        );
    }
    println!("  animatronics: {}", config.animatronics.len());
    for a in &config.animatronics {
        let creds = if a.ssh.is_some() { "ssh" } else { "no creds" };
        println!("    {} -> {}:{} [{}] ({})", a.id, a.host, a.port, a.status, creds);
    }
    let format = match config.logging.format {
        LogFormat::Json => "json",
        LogFormat::Pretty => "pretty",
    };
    println!("  logging:      {} ({})", config.logging.level, format);
}

async fn check_connectivity(
    config: Config,
    only: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = init_store(&config).await?;
    let rbac = Arc::new(RbacEngine::new(store.clone()));
    let audit = Arc::new(AuditLog::with_capacity(config.audit.max_events).with_store(store.clone()));
    let signer = TokenSigner::new(
        &config.auth.token_secret,
        &config.auth.issuer,
        &config.auth.audience,
        config.auth.access_ttl,
        config.auth.refresh_ttl,
    );
    let auth = Arc::new(AuthService::new(store, rbac.clone(), signer, audit.clone()));

    let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new());
    let mut policy = CommandPolicy::default();
    if !config.gateway.tiers.is_empty() {
        policy = policy.with_tiers(config.gateway.tiers.clone());
    }
    if let Some(prefixes) = config.gateway.allow_prefixes.clone() {
        policy = policy.with_allow_prefixes(prefixes);
    }

    let targets: Vec<String> = match only {
        Some(id) => vec![id],
        None => config.animatronics.iter().map(|a| a.id.clone()).collect(),
    };

    let gateway = CommandGateway::new(auth, rbac, executor, audit, config.animatronics)
        .with_policy(policy);

    let mut failures = 0;
    for id in &targets {
        match gateway.probe(id).await {
            Ok(result) if result.success => {
                println!("{:<16} reachable ({} ms)", id, result.duration_ms);
            }
            Ok(result) => {
                failures += 1;
                let reason = result.error.unwrap_or_else(|| "remote failure".to_string());
                println!("{:<16} UNREACHABLE: {}", id, reason);
            }
            Err(e) => {
                failures += 1;
                println!("{:<16} ERROR: {}", id, e);
            }
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} probe(s) failed", failures, targets.len()).into());
    }
    Ok(())
}
