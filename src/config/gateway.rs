//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Payment gateway connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway REST API root, e.g. `https://api.asaas.com/v3`
    pub base_url: String,

    /// API access token sent on every request
    pub api_key: SecretString,

    /// Shared secret used to sign inbound webhooks. When absent,
    /// webhook signatures are not checked.
    #[serde(default)]
    pub webhook_secret: Option<SecretString>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if the configured base URL points at the gateway sandbox
    pub fn is_sandbox(&self) -> bool {
        self.base_url.contains("sandbox")
    }

    /// Validate gateway configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.base_url.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_BASE_URL"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_API_KEY"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidGatewayTimeout);
        }
        if production {
            if !self.base_url.starts_with("https://") {
                return Err(ValidationError::GatewayMustBeHttps);
            }
            let has_secret = self
                .webhook_secret
                .as_ref()
                .is_some_and(|s| !s.expose_secret().is_empty());
            if !has_secret {
                return Err(ValidationError::WebhookSecretRequired);
            }
        }
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig {
            base_url: "https://sandbox.asaas.com/api/v3".to_string(),
            api_key: SecretString::new("$aact_test_key".to_string()),
            webhook_secret: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    #[test]
    fn test_valid_sandbox_config() {
        let config = config();
        assert!(config.is_sandbox());
        assert!(config.validate(false).is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_validation_missing_api_key() {
        let config = GatewayConfig {
            api_key: SecretString::new(String::new()),
            ..config()
        };
        assert!(matches!(
            config.validate(false),
            Err(ValidationError::MissingRequired("GATEWAY_API_KEY"))
        ));
    }

    #[test]
    fn test_validation_rejects_non_http_url() {
        let config = GatewayConfig {
            base_url: "ftp://gateway".to_string(),
            ..config()
        };
        assert!(matches!(
            config.validate(false),
            Err(ValidationError::InvalidGatewayUrl)
        ));
    }

    #[test]
    fn test_validation_timeout_bounds() {
        let config = GatewayConfig {
            timeout_secs: 0,
            ..config()
        };
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_production_requires_webhook_secret() {
        let config = config();
        assert!(matches!(
            config.validate(true),
            Err(ValidationError::WebhookSecretRequired)
        ));

        let config = GatewayConfig {
            webhook_secret: Some(SecretString::new("whsec".to_string())),
            ..config
        };
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_production_requires_https() {
        let config = GatewayConfig {
            base_url: "http://gateway.internal".to_string(),
            webhook_secret: Some(SecretString::new("whsec".to_string())),
            ..config()
        };
        assert!(matches!(
            config.validate(true),
            Err(ValidationError::GatewayMustBeHttps)
        ));
    }
}
