//! HandleGatewayWebhookHandler - Command handler for gateway notifications.
//!
//! Processing order per delivery:
//!
//! 1. Verify the signature (when a secret is configured). Failures are
//!    rejected with 401 and never recorded.
//! 2. Parse the envelope and map it to a ledger effect.
//! 3. Record the event (`processed = false`) before touching the ledger.
//!    A replay of a processed event is acknowledged immediately; a replay
//!    of an unprocessed one resumes from the stored payload.
//! 4. Apply the effect through the ledger's locked transition.
//! 5. Mark the event processed. Only then is the delivery acknowledged.
//!
//! An error in step 4 or 5 leaves the event unprocessed and surfaces as a
//! retryable error so the gateway redelivers.

use std::fmt;
use std::sync::Arc;

use crate::domain::billing::{
    BillingType, GatewayEvent, NewPayment, Payment, PaymentArtifacts, PaymentPayload, PaymentStatus,
    SubscriptionStatus, Transition, TransitionSource, WebhookEffect, WebhookError,
    WebhookVerifier,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{LedgerStore, RecordOutcome, WebhookEventRecord, WebhookEventRepository};

/// Command carrying one raw webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleGatewayWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Signature header, if the request carried one.
    pub signature: Option<String>,
}

/// How a delivery concluded. Stored as the event's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Status moved.
    Applied,
    /// Target equals the current status.
    Unchanged,
    /// Target not reachable; state kept, anomaly logged.
    Rejected,
    /// Installment recorded, no status change requested.
    Recorded,
    /// No local payment or subscription carries the referenced id.
    UnknownReference,
    /// Event type has no ledger effect.
    Ignored,
    /// Event id already processed earlier.
    Duplicate,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Unchanged => "unchanged",
            WebhookOutcome::Rejected => "rejected",
            WebhookOutcome::Recorded => "recorded",
            WebhookOutcome::UnknownReference => "unknown_reference",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Duplicate => "duplicate",
        }
    }

    fn from_transition<S>(transition: &Transition<S>) -> Self {
        match transition {
            Transition::Applied { .. } => WebhookOutcome::Applied,
            Transition::Unchanged(_) => WebhookOutcome::Unchanged,
            Transition::Rejected { .. } => WebhookOutcome::Rejected,
        }
    }
}

impl fmt::Display for WebhookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleGatewayWebhookResult {
    pub event_id: String,
    pub outcome: WebhookOutcome,
}

/// Handler for processing gateway webhooks.
pub struct HandleGatewayWebhookHandler {
    ledger: Arc<dyn LedgerStore>,
    events: Arc<dyn WebhookEventRepository>,
    verifier: Option<WebhookVerifier>,
}

impl HandleGatewayWebhookHandler {
    /// Without a verifier, signatures are not checked.
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        events: Arc<dyn WebhookEventRepository>,
        verifier: Option<WebhookVerifier>,
    ) -> Self {
        Self {
            ledger,
            events,
            verifier,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleGatewayWebhookCommand,
    ) -> Result<HandleGatewayWebhookResult, WebhookError> {
        // 1. Authenticate
        if let Some(verifier) = &self.verifier {
            if let Err(e) = verifier.verify(&cmd.payload, cmd.signature.as_deref()) {
                tracing::warn!(error = %e, "Webhook rejected: signature check failed");
                return Err(e);
            }
        }

        // 2. Parse
        let event = GatewayEvent::parse(&cmd.payload)?;
        event.effect()?;

        // 3. Record before apply
        let record = WebhookEventRecord::received(&event, &cmd.payload, Timestamp::now());
        let event = match self.events.try_record(record).await? {
            RecordOutcome::NewlyRecorded => event,
            RecordOutcome::AlreadyProcessed => {
                tracing::info!(event_id = %event.id, event = %event.event, "Webhook replay acknowledged");
                return Ok(HandleGatewayWebhookResult {
                    event_id: event.id,
                    outcome: WebhookOutcome::Duplicate,
                });
            }
            RecordOutcome::PendingRetry(stored) => {
                tracing::info!(
                    event_id = %stored.event_id,
                    received_at = %stored.received_at.as_datetime(),
                    "Resuming unprocessed webhook"
                );
                GatewayEvent::parse(stored.payload.as_bytes())?
            }
        };

        // 4. Apply
        let outcome = self.apply(&event).await.map_err(|e| {
            tracing::error!(event_id = %event.id, error = %e, "Webhook application failed");
            e
        })?;

        // 5. Mark processed
        self.events
            .mark_processed(&event.id, outcome.as_str(), Timestamp::now())
            .await?;

        tracing::debug!(event_id = %event.id, event = %event.event, outcome = %outcome, "Webhook processed");

        Ok(HandleGatewayWebhookResult {
            event_id: event.id,
            outcome,
        })
    }

    async fn apply(&self, event: &GatewayEvent) -> Result<WebhookOutcome, WebhookError> {
        match event.effect()? {
            WebhookEffect::Ignore(reason) => {
                tracing::debug!(event_id = %event.id, reason = %reason, "Webhook ignored");
                Ok(WebhookOutcome::Ignored)
            }
            WebhookEffect::Payment {
                gateway_payment_id,
                target,
            } => self.apply_payment(event, &gateway_payment_id, target).await,
            WebhookEffect::Subscription {
                gateway_subscription_id,
                target,
            } => {
                self.apply_subscription(event, &gateway_subscription_id, target)
                    .await
            }
        }
    }

    async fn apply_payment(
        &self,
        event: &GatewayEvent,
        gateway_payment_id: &str,
        target: Option<PaymentStatus>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let known = self
            .ledger
            .find_payment_by_gateway_id(gateway_payment_id)
            .await?
            .is_some();

        let recorded = if known {
            false
        } else if self.record_announced_charge(event).await? {
            true
        } else {
            tracing::warn!(
                event_id = %event.id,
                gateway_payment_id,
                "Webhook references unknown payment"
            );
            return Ok(WebhookOutcome::UnknownReference);
        };

        let Some(target) = target else {
            return Ok(if recorded {
                WebhookOutcome::Recorded
            } else {
                WebhookOutcome::Unchanged
            });
        };

        let source = TransitionSource::Webhook {
            event_id: event.id.clone(),
        };
        let Some(update) = self
            .ledger
            .apply_payment_transition(gateway_payment_id, target, &source, Timestamp::now())
            .await?
        else {
            tracing::warn!(event_id = %event.id, gateway_payment_id, "Payment vanished during webhook");
            return Ok(WebhookOutcome::UnknownReference);
        };

        match update.effects.transition {
            Transition::Applied { from, to } => tracing::info!(
                event_id = %event.id,
                payment_id = %update.payment.id,
                member_id = %update.payment.member_id,
                gateway_payment_id,
                from = %from,
                to = %to,
                income_recorded = update.effects.income.is_some(),
                registration_settled = update.registration_settled,
                "Payment status changed"
            ),
            Transition::Unchanged(status) => tracing::debug!(
                event_id = %event.id,
                gateway_payment_id,
                status = %status,
                "Payment already in requested status"
            ),
            Transition::Rejected { current, requested } => tracing::warn!(
                event_id = %event.id,
                gateway_payment_id,
                current = %current,
                requested = %requested,
                "Anomaly: payment transition rejected"
            ),
        }

        Ok(WebhookOutcome::from_transition(&update.effects.transition))
    }

    /// Stores a charge the gateway issued on its own: a subscription
    /// installment, or a later installment of a split event fee.
    ///
    /// Returns false when the payment belongs to neither.
    async fn record_announced_charge(&self, event: &GatewayEvent) -> Result<bool, WebhookError> {
        let Some(payload) = event.payment.as_ref() else {
            return Ok(false);
        };
        if let Some(gateway_subscription_id) = payload.subscription.as_deref() {
            return self
                .record_subscription_installment(event, payload, gateway_subscription_id)
                .await;
        }
        if let Some(gateway_installment_id) = payload.installment.as_deref() {
            return self
                .record_split_installment(event, payload, gateway_installment_id)
                .await;
        }
        Ok(false)
    }

    /// Adds an installment of a split event fee, copying member,
    /// registration and plan from a charge of the same split.
    async fn record_split_installment(
        &self,
        event: &GatewayEvent,
        payload: &PaymentPayload,
        gateway_installment_id: &str,
    ) -> Result<bool, WebhookError> {
        let siblings = self
            .ledger
            .find_payments_by_installment(gateway_installment_id)
            .await?;
        let Some(sibling) = siblings.into_iter().next() else {
            return Ok(false);
        };
        let Some(plan) = sibling.installment.clone() else {
            return Ok(false);
        };

        let (Some(value), Some(due_date)) = (payload.value, payload.due_date) else {
            tracing::warn!(
                event_id = %event.id,
                gateway_payment_id = %payload.id,
                "Installment payload lacks value or due date"
            );
            return Ok(false);
        };

        let billing_type = payload
            .billing_type
            .as_deref()
            .and_then(|s| s.parse::<BillingType>().ok())
            .unwrap_or(sibling.billing_type);

        let payment = Payment::new(
            NewPayment {
                member_id: sibling.member_id,
                subscription_id: None,
                registration_id: sibling.registration_id,
                gateway_payment_id: payload.id.clone(),
                amount: value,
                net_amount: payload.net_value,
                billing_type,
                description: payload.description.clone().or(sibling.description),
                due_date,
                artifacts: PaymentArtifacts {
                    invoice_url: payload.invoice_url.clone(),
                    bank_slip_url: payload.bank_slip_url.clone(),
                    pix_code: None,
                },
            },
            Timestamp::now(),
        )
        .map_err(|e| WebhookError::ParseError(e.to_string()))?
        .with_installment(plan);

        let stored = self.ledger.insert_payment(&payment).await?;
        tracing::info!(
            event_id = %event.id,
            payment_id = %stored.id,
            member_id = %stored.member_id,
            gateway_payment_id = %stored.gateway_payment_id,
            installment_id = gateway_installment_id,
            "Event fee installment recorded"
        );
        Ok(true)
    }

    /// Returns false when the payment does not belong to a local subscription.
    async fn record_subscription_installment(
        &self,
        event: &GatewayEvent,
        payload: &PaymentPayload,
        gateway_subscription_id: &str,
    ) -> Result<bool, WebhookError> {
        let Some(subscription) = self
            .ledger
            .find_subscription_by_gateway_id(gateway_subscription_id)
            .await?
        else {
            return Ok(false);
        };

        let (Some(value), Some(due_date)) = (payload.value, payload.due_date) else {
            tracing::warn!(
                event_id = %event.id,
                gateway_payment_id = %payload.id,
                "Installment payload lacks value or due date"
            );
            return Ok(false);
        };

        let billing_type = payload
            .billing_type
            .as_deref()
            .and_then(|s| s.parse::<BillingType>().ok())
            .unwrap_or(subscription.billing_type);

        let payment = Payment::new(
            NewPayment {
                member_id: subscription.member_id,
                subscription_id: Some(subscription.id),
                registration_id: None,
                gateway_payment_id: payload.id.clone(),
                amount: value,
                net_amount: payload.net_value,
                billing_type,
                description: payload.description.clone(),
                due_date,
                artifacts: PaymentArtifacts {
                    invoice_url: payload.invoice_url.clone(),
                    bank_slip_url: payload.bank_slip_url.clone(),
                    pix_code: None,
                },
            },
            Timestamp::now(),
        )
        .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        let stored = self.ledger.insert_payment(&payment).await?;
        tracing::info!(
            event_id = %event.id,
            payment_id = %stored.id,
            member_id = %stored.member_id,
            gateway_payment_id = %stored.gateway_payment_id,
            due_date = %stored.due_date,
            "Subscription installment recorded"
        );
        Ok(true)
    }

    async fn apply_subscription(
        &self,
        event: &GatewayEvent,
        gateway_subscription_id: &str,
        target: SubscriptionStatus,
    ) -> Result<WebhookOutcome, WebhookError> {
        let Some(update) = self
            .ledger
            .apply_subscription_transition(gateway_subscription_id, target, Timestamp::now())
            .await?
        else {
            tracing::warn!(
                event_id = %event.id,
                gateway_subscription_id,
                "Webhook references unknown subscription"
            );
            return Ok(WebhookOutcome::UnknownReference);
        };

        match update.transition {
            Transition::Applied { from, to } => tracing::info!(
                event_id = %event.id,
                subscription_id = %update.subscription.id,
                member_id = %update.subscription.member_id,
                from = %from,
                to = %to,
                "Subscription status changed"
            ),
            Transition::Unchanged(_) => {}
            Transition::Rejected { current, requested } => tracing::warn!(
                event_id = %event.id,
                gateway_subscription_id,
                current = %current,
                requested = %requested,
                "Anomaly: subscription transition rejected"
            ),
        }

        Ok(WebhookOutcome::from_transition(&update.transition))
    }
}
