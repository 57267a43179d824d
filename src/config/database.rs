//! Postgres connection pool and ledger locking settings

use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

use super::error::ValidationError;

const POOL_CEILING: u32 = 100;

/// Ledger database settings.
///
/// Webhook deliveries and the reconciliation sweep both hold a row lock
/// on the payment they touch, so `lock_timeout_ms` bounds how long one
/// waits for the other before reporting a conflict.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Apply `migrations/` before serving
    #[serde(default)]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    /// Pool builder carrying every sizing and timeout setting.
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE_URL"));
        }
        let scheme_ok = ["postgres://", "postgresql://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme));
        if !scheme_ok {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.max_connections > POOL_CEILING {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        if self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if !(1..=60_000).contains(&self.lock_timeout_ms) {
            return Err(ValidationError::InvalidLockTimeout);
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            lock_timeout_ms: default_lock_timeout_ms(),
            run_migrations: false,
        }
    }
}

fn default_min_connections() -> u32 {
    2
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_wait_five_seconds_for_a_row_lock() {
        let config = DatabaseConfig::default();
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert!(config.min_connections <= config.max_connections);
        assert!(!config.run_migrations);
    }

    #[test]
    fn both_postgres_schemes_are_accepted() {
        assert!(with_url("postgres://localhost/quartel").validate().is_ok());
        assert!(with_url("postgresql://u:p@db:5432/quartel").validate().is_ok());
    }

    #[test]
    fn empty_url_reports_the_missing_variable() {
        assert!(matches!(
            DatabaseConfig::default().validate(),
            Err(ValidationError::MissingRequired("DATABASE_URL"))
        ));
    }

    #[test]
    fn non_postgres_url_is_rejected() {
        assert!(matches!(
            with_url("mysql://localhost/quartel").validate(),
            Err(ValidationError::InvalidDatabaseUrl)
        ));
    }

    #[test]
    fn pool_bounds_are_checked() {
        let inverted = DatabaseConfig {
            min_connections: 8,
            max_connections: 4,
            ..with_url("postgres://localhost/quartel")
        };
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvalidPoolSize)
        ));

        let oversized = DatabaseConfig {
            max_connections: 500,
            ..with_url("postgres://localhost/quartel")
        };
        assert!(matches!(
            oversized.validate(),
            Err(ValidationError::PoolSizeTooLarge)
        ));
    }

    #[test]
    fn lock_timeout_outside_range_is_rejected() {
        for ms in [0, 60_001] {
            let config = DatabaseConfig {
                lock_timeout_ms: ms,
                ..with_url("postgres://localhost/quartel")
            };
            assert!(matches!(
                config.validate(),
                Err(ValidationError::InvalidLockTimeout)
            ));
        }
    }
}
