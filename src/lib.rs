//! Cryptgate - a secure remote-access gateway for animatronic controllers
//!
//! Cryptgate lets authenticated operators issue commands to a small fleet of
//! remote embedded hosts without handing out shell credentials. It combines
//! short-lived token authentication, role-based authorization, and a
//! command-validation-and-dispatch gateway with a durable audit trail.

pub mod audit;
pub mod auth;
pub mod config;
pub mod gateway;
pub mod rbac;
pub mod store;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for cryptgate
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Authentication error: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] gateway::GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Operational status of an animatronic controller.
///
/// Only `Operational` hosts accept control/configure/ssh actions; `view`
/// style reads are unaffected by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalStatus {
    Operational,
    Maintenance,
    Error,
    NotConfigured,
}

impl OperationalStatus {
    /// Parse a status from its config/wire form
    pub fn parse(s: &str) -> Option<OperationalStatus> {
        match s.to_lowercase().as_str() {
            "operational" => Some(OperationalStatus::Operational),
            "maintenance" => Some(OperationalStatus::Maintenance),
            "error" => Some(OperationalStatus::Error),
            "not_configured" => Some(OperationalStatus::NotConfigured),
            _ => None,
        }
    }

    /// Whether remote command dispatch is allowed in this status
    pub fn allows_dispatch(&self) -> bool {
        matches!(self, OperationalStatus::Operational)
    }
}

impl std::fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationalStatus::Operational => write!(f, "operational"),
            OperationalStatus::Maintenance => write!(f, "maintenance"),
            OperationalStatus::Error => write!(f, "error"),
            OperationalStatus::NotConfigured => write!(f, "not_configured"),
        }
    }
}

/// Connection credentials for reaching a controller over SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshCredentials {
    /// Remote login user
    pub user: String,
    /// Private key file used for authentication; keys are provisioned out of
    /// band, the gateway never stores passwords for remote hosts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyfile: Option<PathBuf>,
}

/// A remotely controlled animatronic host the gateway can dispatch to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Animatronic {
    /// Stable identifier (e.g. "orlok", "coffin")
    pub id: String,
    /// Human-readable display name
    pub name: String,
    /// Network address of the controller
    pub host: String,
    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Current operational status
    pub status: OperationalStatus,
    /// Per-resource connection credentials; `None` means the controller is
    /// known but not yet reachable through the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshCredentials>,
}

fn default_ssh_port() -> u16 {
    22
}
