//! Gateway webhook notifications.
//!
//! Only the fields the engine acts on are captured; the rest of the
//! payload is kept verbatim in the webhook audit row.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PaymentStatus, SubscriptionStatus, WebhookError};

/// Envelope pushed by the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    /// Unique event id, the deduplication key.
    pub id: String,

    /// Event name, e.g. `PAYMENT_RECEIVED` or `payment-received`.
    pub event: String,

    #[serde(default)]
    pub date_created: Option<String>,

    #[serde(default)]
    pub payment: Option<PaymentPayload>,

    #[serde(default)]
    pub subscription: Option<SubscriptionPayload>,

    /// Either a customer id or an embedded customer object.
    #[serde(default)]
    pub customer: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    /// Split payment this charge belongs to.
    #[serde(default)]
    pub installment: Option<String>,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub net_value: Option<Decimal>,
    #[serde(default)]
    pub billing_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invoice_url: Option<String>,
    #[serde(default)]
    pub bank_slip_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,
}

/// Event names the engine understands, whichever spelling the gateway used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    PaymentCreated,
    PaymentUpdated,
    PaymentConfirmed,
    PaymentReceived,
    PaymentOverdue,
    PaymentDeleted,
    PaymentRefunded,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    SubscriptionInactivated,
    SubscriptionActivated,
    Other(String),
}

impl GatewayEventKind {
    /// Accepts `PAYMENT_RECEIVED`, `payment-received` and mixed forms.
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "PAYMENT_CREATED" => Self::PaymentCreated,
            "PAYMENT_UPDATED" => Self::PaymentUpdated,
            "PAYMENT_CONFIRMED" => Self::PaymentConfirmed,
            "PAYMENT_RECEIVED" | "PAYMENT_RECEIVED_IN_CASH" => Self::PaymentReceived,
            "PAYMENT_OVERDUE" => Self::PaymentOverdue,
            "PAYMENT_DELETED" => Self::PaymentDeleted,
            "PAYMENT_REFUNDED" => Self::PaymentRefunded,
            "SUBSCRIPTION_CREATED" => Self::SubscriptionCreated,
            "SUBSCRIPTION_UPDATED" => Self::SubscriptionUpdated,
            "SUBSCRIPTION_DELETED" => Self::SubscriptionDeleted,
            "SUBSCRIPTION_INACTIVATED" | "SUBSCRIPTION_EXPIRED" => Self::SubscriptionInactivated,
            "SUBSCRIPTION_ACTIVATED" | "SUBSCRIPTION_RESTORED" => Self::SubscriptionActivated,
            _ => Self::Other(normalized),
        }
    }

    pub fn is_payment_event(&self) -> bool {
        matches!(
            self,
            Self::PaymentCreated
                | Self::PaymentUpdated
                | Self::PaymentConfirmed
                | Self::PaymentReceived
                | Self::PaymentOverdue
                | Self::PaymentDeleted
                | Self::PaymentRefunded
        )
    }
}

/// What an event asks the ledger to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEffect {
    /// Make sure the payment is known locally, then optionally move it.
    Payment {
        gateway_payment_id: String,
        target: Option<PaymentStatus>,
    },

    Subscription {
        gateway_subscription_id: String,
        target: SubscriptionStatus,
    },

    /// Acknowledge without touching the ledger.
    Ignore(String),
}

impl GatewayEvent {
    /// Parses the raw request body.
    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        let event: GatewayEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        if event.id.trim().is_empty() {
            return Err(WebhookError::MissingField("id"));
        }
        Ok(event)
    }

    pub fn kind(&self) -> GatewayEventKind {
        GatewayEventKind::parse(&self.event)
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment.as_ref().map(|p| p.id.as_str())
    }

    /// Subscription referenced directly or through the payment.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .map(|s| s.id.as_str())
            .or_else(|| self.payment.as_ref().and_then(|p| p.subscription.as_deref()))
    }

    pub fn customer_id(&self) -> Option<String> {
        match &self.customer {
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(serde_json::Value::Object(obj)) => {
                obj.get("id").and_then(|v| v.as_str()).map(str::to_string)
            }
            _ => self
                .payment
                .as_ref()
                .and_then(|p| p.customer.clone())
                .or_else(|| self.subscription.as_ref().and_then(|s| s.customer.clone())),
        }
    }

    /// Maps the event onto a ledger effect.
    pub fn effect(&self) -> Result<WebhookEffect, WebhookError> {
        let kind = self.kind();

        if kind.is_payment_event() {
            let payment = self
                .payment
                .as_ref()
                .ok_or(WebhookError::MissingField("payment"))?;
            let target = match kind {
                GatewayEventKind::PaymentConfirmed => Some(PaymentStatus::Confirmed),
                GatewayEventKind::PaymentReceived => Some(PaymentStatus::Received),
                GatewayEventKind::PaymentOverdue => Some(PaymentStatus::Overdue),
                GatewayEventKind::PaymentDeleted => Some(PaymentStatus::Cancelled),
                GatewayEventKind::PaymentRefunded => {
                    return Ok(WebhookEffect::Ignore(format!(
                        "refund of {} is not tracked",
                        payment.id
                    )))
                }
                _ => None,
            };
            return Ok(WebhookEffect::Payment {
                gateway_payment_id: payment.id.clone(),
                target,
            });
        }

        let subscription_target = match kind {
            GatewayEventKind::SubscriptionDeleted => Some(SubscriptionStatus::Cancelled),
            GatewayEventKind::SubscriptionInactivated => Some(SubscriptionStatus::Expired),
            GatewayEventKind::SubscriptionActivated => Some(SubscriptionStatus::Active),
            _ => None,
        };

        match subscription_target {
            Some(target) => {
                let subscription = self
                    .subscription
                    .as_ref()
                    .ok_or(WebhookError::MissingField("subscription"))?;
                Ok(WebhookEffect::Subscription {
                    gateway_subscription_id: subscription.id.clone(),
                    target,
                })
            }
            None => Ok(WebhookEffect::Ignore(format!("event {} not handled", self.event))),
        }
    }
}

impl PaymentStatus {
    /// Maps a gateway payment status onto the local lifecycle.
    ///
    /// Statuses without a local counterpart (refunds, chargebacks,
    /// risk analysis) return `None`.
    pub fn from_gateway(status: &str, deleted: bool) -> Option<Self> {
        if deleted {
            return Some(PaymentStatus::Cancelled);
        }
        match status {
            "PENDING" | "AWAITING_RISK_ANALYSIS" => Some(PaymentStatus::Pending),
            "CONFIRMED" => Some(PaymentStatus::Confirmed),
            "RECEIVED" | "RECEIVED_IN_CASH" => Some(PaymentStatus::Received),
            "OVERDUE" => Some(PaymentStatus::Overdue),
            _ => None,
        }
    }
}
