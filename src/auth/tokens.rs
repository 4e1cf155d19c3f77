//! Signed token minting and verification
//!
//! Access and refresh tokens are HS256 JWTs. The access token embeds a user
//! summary and per-resource permission grants so the serving layer can build
//! authorization summaries without a round-trip; the refresh token carries
//! only the subject and session id.

use super::types::User;
use super::AuthError;
use crate::rbac::Permission;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which of the two token kinds a claim set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Identity summary embedded in access tokens and returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub role: String,
}

impl UserSummary {
    pub fn of(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            role: user.role_id.clone(),
        }
    }
}

/// Resource-access grants: animatronic id pattern -> permissions held there
pub type Grants = BTreeMap<String, Vec<Permission>>;

/// JWT claim set for both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    /// Subject: user id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub kind: TokenKind,
    /// Owning session id; the revocation hook
    pub sid: String,
    /// Present on access tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    /// Present on access tokens only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub grants: Grants,
}

/// Mints and verifies the gateway's signed tokens
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    pub fn new(
        secret: &SecretString,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        let secret_bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret_bytes),
            decoding: DecodingKey::from_secret(secret_bytes),
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Mint a short-lived access token embedding identity and grants
    pub fn mint_access(
        &self,
        user: &UserSummary,
        grants: Grants,
        session_id: &str,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: user.id.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            kind: TokenKind::Access,
            sid: session_id.to_string(),
            user: Some(user.clone()),
            grants,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Mint a longer-lived refresh token carrying only subject and session
    pub fn mint_refresh(&self, user_id: &str, session_id: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            kind: TokenKind::Refresh,
            sid: session_id.to_string(),
            user: None,
            grants: BTreeMap::new(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Decode and validate signature, issuer, audience, and expiry.
    /// Session liveness is the caller's job; this stage is purely
    /// cryptographic.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }

    /// Refresh token lifetime in seconds, for cookie max-age at the serving
    /// boundary
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }
}
