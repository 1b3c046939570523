//! Environment-driven server configuration.

use anyhow::{bail, Context};
use billing_store::{AdvancePolicy, StoreConfig};
use std::env;
use std::net::SocketAddr;

/// Everything the server needs from its environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub unlock_window_hours: i64,
    pub advance_auto_apply: bool,
    pub run_migrations: bool,
}

impl ServerConfig {
    /// Load configuration from the environment (and `.env` if present).
    pub fn from_env() -> anyhow::Result<Self> {
        // Missing .env is fine; real deployments set the environment.
        let _ = dotenvy::dotenv();

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let host = env::var("BILLING_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env::var("BILLING_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("BILLING_PORT must be a port number")?;
        let bind_addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("invalid BILLING_HOST/BILLING_PORT combination")?;

        let unlock_window_hours: i64 = env::var("BILLING_UNLOCK_WINDOW_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse()
            .context("BILLING_UNLOCK_WINDOW_HOURS must be an integer")?;
        if unlock_window_hours <= 0 {
            bail!("BILLING_UNLOCK_WINDOW_HOURS must be positive");
        }

        let advance_auto_apply = env::var("BILLING_ADVANCE_AUTO_APPLY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let run_migrations = env::var("BILLING_RUN_MIGRATIONS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Ok(Self {
            database_url,
            bind_addr,
            unlock_window_hours,
            advance_auto_apply,
            run_migrations,
        })
    }

    /// Store-level configuration slice. Fails fast on unsupported policy
    /// combinations rather than ignoring them at request time.
    pub fn store_config(&self) -> anyhow::Result<StoreConfig> {
        let advance_policy = AdvancePolicy {
            auto_apply: self.advance_auto_apply,
        };
        advance_policy
            .validate()
            .context("unsupported advance policy")?;
        Ok(StoreConfig {
            unlock_window_hours: self.unlock_window_hours,
            advance_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_apply_configuration_is_rejected() {
        let config = ServerConfig {
            database_url: "postgres://localhost/billing".into(),
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            unlock_window_hours: 24,
            advance_auto_apply: true,
            run_migrations: false,
        };
        assert!(config.store_config().is_err());
    }
}
