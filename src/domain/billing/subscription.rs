//! Recurring-dues subscriptions and the gateway customer they bill.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ledger::money;
use super::{BillingType, SubscriptionStatus, Transition};
use crate::domain::foundation::{MemberId, SubscriptionId, Timestamp, ValidationError};

/// A member's customer record at the gateway. One per member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub member_id: MemberId,
    pub gateway_customer_id: String,
    pub created_at: Timestamp,
}

/// How often a subscription bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "MONTHLY",
            BillingCycle::Quarterly => "QUARTERLY",
            BillingCycle::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MONTHLY" => Ok(BillingCycle::Monthly),
            "QUARTERLY" => Ok(BillingCycle::Quarterly),
            "YEARLY" => Ok(BillingCycle::Yearly),
            other => Err(ValidationError::invalid_format(
                "billing_cycle",
                format!("unknown cycle '{}'", other),
            )),
        }
    }
}

/// Recurring-dues agreement between a member and the community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub member_id: MemberId,
    pub gateway_subscription_id: String,
    pub gateway_customer_id: String,
    pub status: SubscriptionStatus,
    pub amount: Decimal,
    pub cycle: BillingCycle,
    pub billing_type: BillingType,
    pub next_due_date: NaiveDate,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub cancelled_at: Option<Timestamp>,
}

/// Fields needed to record a subscription the gateway has just created.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub member_id: MemberId,
    pub gateway_subscription_id: String,
    pub gateway_customer_id: String,
    pub amount: Decimal,
    pub cycle: BillingCycle,
    pub billing_type: BillingType,
    pub next_due_date: NaiveDate,
}

impl Subscription {
    /// Records a subscription in ACTIVE.
    pub fn new(input: NewSubscription, now: Timestamp) -> Result<Self, ValidationError> {
        if input.gateway_subscription_id.trim().is_empty() {
            return Err(ValidationError::empty_field("gateway_subscription_id"));
        }
        if input.amount <= Decimal::ZERO {
            return Err(ValidationError::not_positive("amount", input.amount));
        }

        Ok(Self {
            id: SubscriptionId::new(),
            member_id: input.member_id,
            gateway_subscription_id: input.gateway_subscription_id,
            gateway_customer_id: input.gateway_customer_id,
            status: SubscriptionStatus::Active,
            amount: money(input.amount),
            cycle: input.cycle,
            billing_type: input.billing_type,
            next_due_date: input.next_due_date,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// Moves the subscription towards `target`. Only applied transitions
    /// mutate the record.
    pub fn apply_transition(
        &mut self,
        target: SubscriptionStatus,
        at: Timestamp,
    ) -> Transition<SubscriptionStatus> {
        let transition = Transition::decide(self.status, target);
        if transition.is_applied() {
            self.status = target;
            self.updated_at = at;
            self.cancelled_at = match target {
                SubscriptionStatus::Cancelled => Some(at),
                SubscriptionStatus::Active => None,
                SubscriptionStatus::Expired => self.cancelled_at,
            };
        }
        transition
    }
}
