//! CancelSubscriptionHandler - Command handler for ending a member's dues.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, RequestContext, Subscription, SubscriptionStatus, Transition,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{LedgerStore, PaymentGateway};

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub ctx: RequestContext,
    pub subscription_id: SubscriptionId,
}

pub type CancelSubscriptionResult = Subscription;

/// Handler for cancelling subscriptions.
///
/// The gateway is asked first; the local row only moves to CANCELLED once
/// the gateway has stopped billing. Cancelling twice is a no-op.
pub struct CancelSubscriptionHandler {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CancelSubscriptionHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { ledger, gateway }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let subscription = self
            .ledger
            .find_subscription(cmd.subscription_id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(cmd.subscription_id))?;

        cmd.ctx.require_self_or_admin(subscription.member_id)?;

        match subscription.status {
            SubscriptionStatus::Cancelled => return Ok(subscription),
            SubscriptionStatus::Expired => {
                return Err(BillingError::validation(
                    "status",
                    "subscription has already expired",
                ))
            }
            SubscriptionStatus::Active => {}
        }

        self.gateway
            .cancel_subscription(&subscription.gateway_subscription_id)
            .await
            .map_err(|e| {
                tracing::warn!(
                    operation = "cancel_subscription",
                    member_id = %subscription.member_id,
                    gateway_subscription_id = %subscription.gateway_subscription_id,
                    error = %e,
                    "Gateway subscription cancellation failed"
                );
                BillingError::from(e)
            })?;

        let update = self
            .ledger
            .apply_subscription_transition(
                &subscription.gateway_subscription_id,
                SubscriptionStatus::Cancelled,
                Timestamp::now(),
            )
            .await?
            .ok_or(BillingError::SubscriptionNotFound(cmd.subscription_id))?;

        if let Transition::Applied { .. } = update.transition {
            tracing::info!(
                member_id = %update.subscription.member_id,
                subscription_id = %update.subscription.id,
                cancelled_by = %cmd.ctx.member_id,
                "Subscription cancelled"
            );
        }

        Ok(update.subscription)
    }
}
