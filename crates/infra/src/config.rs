use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dotenvy::dotenv;
use tracing::warn;

use rolegate_core::IdentityId;

use crate::retry::RetryPolicy;

/// Signing secret used when `ROLEGATE_TOKEN_SECRET` is unset. Only for local
/// development; tokens signed with it are forgeable by anyone who reads this.
pub const DEV_TOKEN_SECRET: &str = "rolegate-dev-secret-do-not-deploy";

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub token_secret: String,
    pub token_issuer: String,
    pub token_ttl: Duration,
    /// When set, Postgres stores are used. Otherwise everything is in memory.
    pub database_url: Option<String>,
    pub call_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Identity seeded as the first elevated identity at startup.
    pub bootstrap_elevated: Option<IdentityId>,
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = var("ROLEGATE_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("ROLEGATE_BIND_ADDR must be a socket address")?;

        let token_secret = match var("ROLEGATE_TOKEN_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("ROLEGATE_TOKEN_SECRET not set, using the development secret");
                DEV_TOKEN_SECRET.to_string()
            }
        };
        if token_secret.len() < 16 {
            bail!("ROLEGATE_TOKEN_SECRET must be at least 16 bytes");
        }

        let token_ttl_secs: u64 = parse_or(&var, "ROLEGATE_TOKEN_TTL_SECS", 3600)?;
        if token_ttl_secs == 0 {
            bail!("ROLEGATE_TOKEN_TTL_SECS must be positive");
        }
        let retry_max_attempts: u32 = parse_or(&var, "ROLEGATE_RETRY_MAX_ATTEMPTS", 3)?;
        if retry_max_attempts == 0 {
            bail!("ROLEGATE_RETRY_MAX_ATTEMPTS must be at least 1");
        }

        let bootstrap_elevated = var("ROLEGATE_BOOTSTRAP_ELEVATED")
            .map(IdentityId::new)
            .transpose()
            .context("ROLEGATE_BOOTSTRAP_ELEVATED must be a valid identity id")?;

        Ok(Self {
            bind_addr,
            token_secret,
            token_issuer: var("ROLEGATE_TOKEN_ISSUER").unwrap_or_else(|| "rolegate".to_string()),
            token_ttl: Duration::from_secs(token_ttl_secs),
            database_url: var("DATABASE_URL"),
            call_timeout: Duration::from_millis(parse_or(&var, "ROLEGATE_CALL_TIMEOUT_MS", 2000)?),
            retry_max_attempts,
            retry_base_delay: Duration::from_millis(parse_or(&var, "ROLEGATE_RETRY_BASE_DELAY_MS", 50)?),
            retry_max_delay: Duration::from_millis(parse_or(&var, "ROLEGATE_RETRY_MAX_DELAY_MS", 1000)?),
            bootstrap_elevated,
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.token_secret == DEV_TOKEN_SECRET
    }

    /// Policy for request-path calls to the profile store and identity provider.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.retry_max_attempts,
            self.retry_base_delay,
            self.retry_max_delay,
            self.call_timeout,
        )
    }

    /// Policy for work off the request path (deletions, background
    /// revocation): same shape, more attempts.
    pub fn background_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.retry_max_attempts.saturating_mul(2),
            self.retry_base_delay,
            self.retry_max_delay.saturating_mul(4),
            self.call_timeout,
        )
    }

    pub fn token_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.token_ttl).unwrap_or_else(|_| chrono::Duration::hours(1))
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let c = load(&[]).unwrap();
        assert_eq!(c.bind_addr.port(), 8080);
        assert!(c.uses_dev_secret());
        assert_eq!(c.token_issuer, "rolegate");
        assert_eq!(c.token_ttl, Duration::from_secs(3600));
        assert!(c.database_url.is_none());
        assert_eq!(c.call_timeout, Duration::from_millis(2000));
        assert_eq!(c.retry_policy().max_attempts, 3);
        assert!(c.bootstrap_elevated.is_none());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let c = load(&[
            ("ROLEGATE_BIND_ADDR", "127.0.0.1:9000"),
            ("ROLEGATE_TOKEN_SECRET", "a-long-enough-production-secret"),
            ("ROLEGATE_TOKEN_TTL_SECS", "60"),
            ("DATABASE_URL", "postgres://localhost/rolegate"),
            ("ROLEGATE_RETRY_MAX_ATTEMPTS", "5"),
            ("ROLEGATE_BOOTSTRAP_ELEVATED", "admin-1"),
        ])
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert!(!c.uses_dev_secret());
        assert_eq!(c.token_ttl_chrono(), chrono::Duration::seconds(60));
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/rolegate"));
        assert_eq!(c.retry_policy().max_attempts, 5);
        assert_eq!(c.background_retry_policy().max_attempts, 10);
        assert_eq!(c.bootstrap_elevated.unwrap().as_str(), "admin-1");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let c = load(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(c.database_url.is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load(&[("ROLEGATE_BIND_ADDR", "nope")]).is_err());
        assert!(load(&[("ROLEGATE_TOKEN_TTL_SECS", "soon")]).is_err());
        assert!(load(&[("ROLEGATE_TOKEN_TTL_SECS", "0")]).is_err());
        assert!(load(&[("ROLEGATE_RETRY_MAX_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("ROLEGATE_TOKEN_SECRET", "short")]).is_err());
    }
}
