//! Billing types offered by the gateway and what each one supports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// How a member settles a charge.
///
/// `Undefined` lets the member pick on the gateway's invoice page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingType {
    Pix,
    Boleto,
    CreditCard,
    DebitCard,
    Undefined,
}

/// Billing-type dependent behaviour, decided in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingCapabilities {
    /// Charge may be split into monthly installments.
    pub installments: bool,
    /// Gateway issues a PIX copy-and-paste payload and QR image.
    pub pix_qr_code: bool,
    /// Gateway issues a printable bank slip.
    pub bank_slip: bool,
    /// Maximum number of installments accepted for a single charge.
    pub max_installments: u8,
}

impl BillingType {
    pub fn capabilities(&self) -> BillingCapabilities {
        match self {
            BillingType::Pix => BillingCapabilities {
                installments: false,
                pix_qr_code: true,
                bank_slip: false,
                max_installments: 1,
            },
            BillingType::Boleto => BillingCapabilities {
                installments: true,
                pix_qr_code: false,
                bank_slip: true,
                max_installments: 12,
            },
            BillingType::CreditCard => BillingCapabilities {
                installments: true,
                pix_qr_code: false,
                bank_slip: false,
                max_installments: 12,
            },
            BillingType::DebitCard => BillingCapabilities {
                installments: false,
                pix_qr_code: false,
                bank_slip: false,
                max_installments: 1,
            },
            BillingType::Undefined => BillingCapabilities {
                installments: false,
                pix_qr_code: true,
                bank_slip: true,
                max_installments: 1,
            },
        }
    }

    /// Checks a requested installment count against the capability table.
    pub fn validate_installments(&self, count: u8) -> Result<(), ValidationError> {
        let caps = self.capabilities();
        if count == 0 {
            return Err(ValidationError::not_positive("installment_count", count));
        }
        if count > 1 && !caps.installments {
            return Err(ValidationError::invalid_format(
                "installment_count",
                format!("{} charges cannot be split into installments", self),
            ));
        }
        if count > caps.max_installments {
            return Err(ValidationError::invalid_format(
                "installment_count",
                format!("at most {} installments allowed", caps.max_installments),
            ));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingType::Pix => "PIX",
            BillingType::Boleto => "BOLETO",
            BillingType::CreditCard => "CREDIT_CARD",
            BillingType::DebitCard => "DEBIT_CARD",
            BillingType::Undefined => "UNDEFINED",
        }
    }
}

impl fmt::Display for BillingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PIX" => Ok(BillingType::Pix),
            "BOLETO" => Ok(BillingType::Boleto),
            "CREDIT_CARD" => Ok(BillingType::CreditCard),
            "DEBIT_CARD" => Ok(BillingType::DebitCard),
            "UNDEFINED" => Ok(BillingType::Undefined),
            other => Err(ValidationError::invalid_format(
                "billing_type",
                format!("unknown billing type '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pix_has_qr_code_but_no_installments() {
        let caps = BillingType::Pix.capabilities();
        assert!(caps.pix_qr_code);
        assert!(!caps.installments);
        assert!(!caps.bank_slip);
    }

    #[test]
    fn boleto_issues_bank_slip() {
        assert!(BillingType::Boleto.capabilities().bank_slip);
    }

    #[test]
    fn credit_card_accepts_up_to_twelve_installments() {
        assert!(BillingType::CreditCard.validate_installments(12).is_ok());
        assert!(BillingType::CreditCard.validate_installments(13).is_err());
    }

    #[test]
    fn pix_rejects_split_charge() {
        assert!(BillingType::Pix.validate_installments(1).is_ok());
        assert!(BillingType::Pix.validate_installments(3).is_err());
    }

    #[test]
    fn zero_installments_rejected() {
        assert!(BillingType::Boleto.validate_installments(0).is_err());
    }

    #[test]
    fn billing_type_parses_gateway_names() {
        assert_eq!("CREDIT_CARD".parse::<BillingType>().unwrap(), BillingType::CreditCard);
        assert!("CASH".parse::<BillingType>().is_err());
        let json = serde_json::to_string(&BillingType::DebitCard).unwrap();
        assert_eq!(json, "\"DEBIT_CARD\"");
    }
}
