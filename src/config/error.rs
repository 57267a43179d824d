//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Request timeout must be between 5 and 300 seconds")]
    InvalidTimeout,

    #[error("Request body limit must be at least 1024 bytes")]
    InvalidBodyLimit,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Lock timeout must be between 1 and 60000 milliseconds")]
    InvalidLockTimeout,

    #[error("Gateway base URL must be an http(s) URL")]
    InvalidGatewayUrl,

    #[error("Gateway base URL must use HTTPS in production")]
    GatewayMustBeHttps,

    #[error("Gateway timeout must be between 1 and 120 seconds")]
    InvalidGatewayTimeout,

    #[error("Webhook secret is required in production")]
    WebhookSecretRequired,

    #[error("At least one eligible rank must be configured")]
    NoEligibleRanks,

    #[error("Monthly amount must be positive")]
    InvalidMonthlyAmount,

    #[error("Due date offset must be between 1 and 365 days")]
    InvalidDueDateOffset,

    #[error("Invalid reconciliation sweep settings: {0}")]
    InvalidSweep(&'static str),
}
