//! Typed settings for the billing service.
//!
//! Everything is read from `QUARTEL__`-prefixed environment variables (a
//! `.env` file is honoured in development), with `__` separating nesting
//! levels: `QUARTEL__BILLING__MONTHLY_AMOUNT=12.50` sets
//! `billing.monthly_amount`.
//!
//! ```no_run
//! use quartel_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("configuration");
//! config.validate().expect("valid configuration");
//! ```

mod billing;
mod database;
mod error;
mod gateway;
mod server;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use gateway::GatewayConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// All service settings. Only `database` and `gateway` have required keys.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub gateway: GatewayConfig,

    /// Dues terms, eligible ranks and sweep cadence
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Reads `.env` (if any) and the process environment.
    ///
    /// Fails when a required key is missing or a value does not parse.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("QUARTEL")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Runs every section's checks; gateway rules tighten in production.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.gateway.validate(self.is_production())?;
        self.billing.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Process environment is shared between test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const REQUIRED: [(&str, &str); 3] = [
        ("QUARTEL__DATABASE__URL", "postgresql://test@localhost/quartel"),
        ("QUARTEL__GATEWAY__BASE_URL", "https://sandbox.asaas.com/api/v3"),
        ("QUARTEL__GATEWAY__API_KEY", "$aact_test"),
    ];

    fn load_with(extra: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, value) in REQUIRED.iter().chain(extra) {
            env::set_var(key, value);
        }
        let loaded = AppConfig::load();
        for (key, _) in REQUIRED.iter().chain(extra) {
            env::remove_var(key);
        }
        loaded
    }

    #[test]
    fn required_keys_are_enough_to_start() {
        let config = load_with(&[]).unwrap();

        assert_eq!(config.database.url, "postgresql://test@localhost/quartel");
        assert!(config.gateway.webhook_secret.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dues_default_to_ten_reais_due_in_thirty_days() {
        let config = load_with(&[]).unwrap();

        assert_eq!(config.billing.monthly_amount.to_string(), "10.00");
        assert_eq!(config.billing.due_date_offset_days, 30);
    }

    #[test]
    fn nested_keys_override_defaults() {
        let config = load_with(&[
            ("QUARTEL__BILLING__MONTHLY_AMOUNT", "12.50"),
            ("QUARTEL__SERVER__PORT", "3000"),
        ])
        .unwrap();

        assert_eq!(config.billing.monthly_amount.to_string(), "12.50");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn production_requires_a_webhook_secret() {
        let config = load_with(&[("QUARTEL__SERVER__ENVIRONMENT", "production")]).unwrap();

        assert!(config.is_production());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::WebhookSecretRequired)
        ));
    }
}
