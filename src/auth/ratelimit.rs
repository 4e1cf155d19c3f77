//! Login attempt rate limiting
//!
//! Tracks failed authentication attempts per caller address and locks out
//! addresses that exceed the window. Consulted by the serving layer before
//! it calls `AuthService::authenticate`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Maximum failed attempts before lockout
const MAX_LOGIN_ATTEMPTS: u32 = 5;
/// Sliding window for counting attempts
const RATE_LIMIT_WINDOW_SECS: u64 = 300;
/// Lockout duration once the window is exhausted
const LOCKOUT_DURATION_SECS: u64 = 900;

/// Rate limiter for login attempts, keyed by caller address
#[derive(Debug, Clone)]
pub struct LoginRateLimiter {
    attempts: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
    lockouts: Arc<RwLock<HashMap<IpAddr, Instant>>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            lockouts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check if a login attempt is allowed.
    /// Returns Ok(()) if allowed, Err with remaining lockout seconds if not.
    pub async fn check(&self, ip: &IpAddr) -> Result<(), u64> {
        let lockouts = self.lockouts.read().await;
        if let Some(lockout_start) = lockouts.get(ip) {
            let lockout = Duration::from_secs(LOCKOUT_DURATION_SECS);
            let elapsed = lockout_start.elapsed();
            if elapsed < lockout {
                return Err((lockout - elapsed).as_secs());
            }
        }
        drop(lockouts);

        let mut attempts = self.attempts.write().await;
        let now = Instant::now();
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);

        if let Some(ip_attempts) = attempts.get_mut(ip) {
            ip_attempts.retain(|t| now.duration_since(*t) < window);

            if ip_attempts.len() >= MAX_LOGIN_ATTEMPTS as usize {
                if let Some(oldest) = ip_attempts.first() {
                    let remaining = window.saturating_sub(now.duration_since(*oldest));
                    return Err(remaining.as_secs());
                }
            }
        }

        Ok(())
    }

    /// Record a failed login attempt
    pub async fn record_failure(&self, ip: &IpAddr) {
        let mut attempts = self.attempts.write().await;
        let now = Instant::now();
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);

        let ip_attempts = attempts.entry(*ip).or_insert_with(Vec::new);
        ip_attempts.retain(|t| now.duration_since(*t) < window);
        ip_attempts.push(now);

        if ip_attempts.len() >= MAX_LOGIN_ATTEMPTS as usize {
            drop(attempts);
            let mut lockouts = self.lockouts.write().await;
            lockouts.insert(*ip, now);
        }
    }

    /// Clear attempts for an address after a successful login
    pub async fn clear(&self, ip: &IpAddr) {
        let mut attempts = self.attempts.write().await;
        attempts.remove(ip);

        let mut lockouts = self.lockouts.write().await;
        lockouts.remove(ip);
    }

    /// Drop stale entries; call periodically
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);
        let lockout = Duration::from_secs(LOCKOUT_DURATION_SECS);

        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < window);
            !timestamps.is_empty()
        });
        drop(attempts);

        let mut lockouts = self.lockouts.write().await;
        lockouts.retain(|_, lockout_start| lockout_start.elapsed() < lockout);
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
