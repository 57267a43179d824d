//! Billing policy configuration

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::billing::{BillingType, EligibilityPolicy, Rank};

/// Dues policy, reconciliation sweep cadence and webhook freshness limits.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Ranks allowed to subscribe to dues (comma-separated)
    #[serde(default = "default_eligible_ranks")]
    pub eligible_ranks: String,

    /// Amount charged every cycle
    #[serde(default = "default_monthly_amount")]
    pub monthly_amount: Decimal,

    /// Days from subscription creation to the first due date
    #[serde(default = "default_due_date_offset_days")]
    pub due_date_offset_days: i64,

    /// Billing type requested for dues when the member does not pick one
    #[serde(default = "default_billing_type")]
    pub default_billing_type: BillingType,

    #[serde(default = "default_true")]
    pub sweep_enabled: bool,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Days past due before a pending payment is re-read from the gateway
    #[serde(default = "default_sweep_grace_days")]
    pub sweep_grace_days: i64,

    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: u32,

    /// Oldest signed webhook accepted, in seconds
    #[serde(default = "default_max_event_age_secs")]
    pub max_event_age_secs: u64,

    /// Tolerated clock drift for signed webhooks, in seconds
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: u64,
}

impl BillingConfig {
    /// Builds the rank allow-list. Unrecognised names are skipped.
    pub fn eligibility_policy(&self) -> EligibilityPolicy {
        let ranks = self
            .eligible_ranks
            .split(',')
            .filter_map(|name| name.trim().parse::<Rank>().ok());
        EligibilityPolicy::new(ranks)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.eligibility_policy().is_empty() {
            return Err(ValidationError::NoEligibleRanks);
        }
        if self.monthly_amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidMonthlyAmount);
        }
        if !(1..=365).contains(&self.due_date_offset_days) {
            return Err(ValidationError::InvalidDueDateOffset);
        }
        if self.sweep_interval_secs < 10 {
            return Err(ValidationError::InvalidSweep("interval must be at least 10 seconds"));
        }
        if self.sweep_grace_days < 0 {
            return Err(ValidationError::InvalidSweep("grace days cannot be negative"));
        }
        if self.sweep_batch_size == 0 || self.sweep_batch_size > 1000 {
            return Err(ValidationError::InvalidSweep("batch size must be between 1 and 1000"));
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            eligible_ranks: default_eligible_ranks(),
            monthly_amount: default_monthly_amount(),
            due_date_offset_days: default_due_date_offset_days(),
            default_billing_type: default_billing_type(),
            sweep_enabled: true,
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_grace_days: default_sweep_grace_days(),
            sweep_batch_size: default_sweep_batch_size(),
            max_event_age_secs: default_max_event_age_secs(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
        }
    }
}

fn default_eligible_ranks() -> String {
    "soldado,cabo,sargento,subtenente,tenente,capitao,major,tenente_coronel,coronel".to_string()
}

fn default_monthly_amount() -> Decimal {
    Decimal::new(1000, 2)
}

fn default_due_date_offset_days() -> i64 {
    30
}

fn default_billing_type() -> BillingType {
    BillingType::Undefined
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    900
}

fn default_sweep_grace_days() -> i64 {
    3
}

fn default_sweep_batch_size() -> u32 {
    100
}

fn default_max_event_age_secs() -> u64 {
    300
}

fn default_max_clock_skew_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_defaults() {
        let config = BillingConfig::default();
        assert_eq!(config.monthly_amount.to_string(), "10.00");
        assert_eq!(config.due_date_offset_days, 30);
        assert_eq!(config.default_billing_type, BillingType::Undefined);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_policy_admits_soldado_but_not_recruta() {
        let policy = BillingConfig::default().eligibility_policy();
        assert!(policy.is_eligible(Rank::Soldado));
        assert!(!policy.is_eligible(Rank::Recruta));
    }

    #[test]
    fn test_policy_skips_unknown_rank_names() {
        let config = BillingConfig {
            eligible_ranks: " cabo , admiral ".to_string(),
            ..Default::default()
        };
        let policy = config.eligibility_policy();
        assert!(policy.is_eligible(Rank::Cabo));
        assert!(!policy.is_eligible(Rank::Soldado));
    }

    #[test]
    fn test_validation_rejects_empty_policy() {
        let config = BillingConfig {
            eligible_ranks: "admiral".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::NoEligibleRanks)
        ));
    }

    #[test]
    fn test_validation_rejects_non_positive_amount() {
        let config = BillingConfig {
            monthly_amount: Decimal::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidMonthlyAmount)
        ));
    }

    #[test]
    fn test_validation_rejects_bad_sweep_batch() {
        let config = BillingConfig {
            sweep_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
