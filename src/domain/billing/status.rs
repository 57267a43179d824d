//! Payment and subscription status state machines.
//!
//! Payments only move forward: once funds settle or the charge is
//! cancelled the payment is closed for good. A transition request into
//! the current state is not a transition at all; callers treat it as a
//! successful no-op so re-delivered notifications stay harmless.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Lifecycle of a single charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Charge issued, nothing paid yet.
    Pending,

    /// Gateway has accepted the payment but funds have not settled.
    /// Never recognised as income.
    Confirmed,

    /// Funds settled. Terminal.
    Received,

    /// Due date passed without payment.
    Overdue,

    /// Charge withdrawn. Terminal.
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Confirmed,
        PaymentStatus::Received,
        PaymentStatus::Overdue,
        PaymentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Received => "RECEIVED",
            PaymentStatus::Overdue => "OVERDUE",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    /// Position on the forward track PENDING < CONFIRMED < RECEIVED.
    /// Side branches (OVERDUE, CANCELLED) rank after CONFIRMED.
    pub fn progress_rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Confirmed => 1,
            PaymentStatus::Overdue => 2,
            PaymentStatus::Received | PaymentStatus::Cancelled => 3,
        }
    }

    /// Statuses the reconciliation sweep re-reads from the gateway.
    pub fn awaiting_settlement(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Confirmed)
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Pending | Confirmed, Received)
                | (Pending | Confirmed, Overdue)
                | (Pending | Confirmed | Overdue, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Confirmed, Received, Overdue, Cancelled],
            Confirmed => vec![Received, Overdue, Cancelled],
            Overdue => vec![Cancelled],
            Received | Cancelled => vec![],
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "CONFIRMED" => Ok(PaymentStatus::Confirmed),
            "RECEIVED" => Ok(PaymentStatus::Received),
            "OVERDUE" => Ok(PaymentStatus::Overdue),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Lifecycle of a recurring-dues agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Cancelled => "CANCELLED",
            SubscriptionStatus::Expired => "EXPIRED",
        }
    }
}

impl StateMachine for SubscriptionStatus {
    // The gateway can reactivate an inactivated subscription, so both
    // inactive states lead back to ACTIVE. CANCELLED -> EXPIRED is a
    // bookkeeping downgrade when the gateway later reports expiry.
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            (Active, Cancelled) | (Active, Expired) | (Cancelled, Active) | (Expired, Active)
                | (Cancelled, Expired)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Active => vec![Cancelled, Expired],
            Cancelled => vec![Active, Expired],
            Expired => vec![Active],
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            "CANCELLED" => Ok(SubscriptionStatus::Cancelled),
            "EXPIRED" => Ok(SubscriptionStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "subscription_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}
