//! SubscribeMemberHandler - Command handler for enrolling a member in monthly dues.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::billing::{
    BillingCycle, BillingError, BillingType, EligibilityPolicy, NewSubscription, RequestContext,
    Subscription,
};
use crate::domain::foundation::{ErrorCode, MemberId, Timestamp};
use crate::ports::{CreateSubscriptionRequest, LedgerStore, MemberDirectory, PaymentGateway};

use super::gateway_customer::ensure_gateway_customer;

/// Command to subscribe a member to recurring dues.
#[derive(Debug, Clone)]
pub struct SubscribeMemberCommand {
    pub ctx: RequestContext,
    pub member_id: MemberId,
    /// Overrides the configured default billing type.
    pub billing_type: Option<BillingType>,
}

/// The newly created ACTIVE subscription.
pub type SubscribeMemberResult = Subscription;

/// Amount and schedule applied to every new subscription.
#[derive(Debug, Clone)]
pub struct DuesTerms {
    pub amount: Decimal,
    pub cycle: BillingCycle,
    pub due_date_offset_days: i64,
    pub default_billing_type: BillingType,
}

impl Default for DuesTerms {
    fn default() -> Self {
        Self {
            amount: Decimal::new(1000, 2),
            cycle: BillingCycle::Monthly,
            due_date_offset_days: 30,
            default_billing_type: BillingType::Undefined,
        }
    }
}

/// Handler for subscribing a member to dues.
///
/// The gateway customer is created on first use and kept even when the
/// subsequent subscription call fails, so a retry reuses it. A local
/// subscription row is only written after the gateway has accepted the
/// subscription.
pub struct SubscribeMemberHandler {
    members: Arc<dyn MemberDirectory>,
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    policy: EligibilityPolicy,
    terms: DuesTerms,
}

impl SubscribeMemberHandler {
    pub fn new(
        members: Arc<dyn MemberDirectory>,
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        policy: EligibilityPolicy,
        terms: DuesTerms,
    ) -> Self {
        Self {
            members,
            ledger,
            gateway,
            policy,
            terms,
        }
    }

    pub async fn handle(
        &self,
        cmd: SubscribeMemberCommand,
    ) -> Result<SubscribeMemberResult, BillingError> {
        cmd.ctx.require_self_or_admin(cmd.member_id)?;

        // 1. Load member and check eligibility before touching the gateway
        let member = self
            .members
            .find_member(cmd.member_id)
            .await?
            .ok_or(BillingError::MemberNotFound(cmd.member_id))?;

        if !self.policy.is_eligible(member.rank) {
            tracing::info!(
                member_id = %member.id,
                rank = %member.rank,
                "Subscription refused: rank not eligible"
            );
            return Err(BillingError::Ineligible {
                member_id: member.id,
                rank: member.rank,
            });
        }

        if self.ledger.find_active_subscription(member.id).await?.is_some() {
            return Err(BillingError::AlreadySubscribed(member.id));
        }

        // 2. Reuse or create the gateway customer
        let customer =
            ensure_gateway_customer(self.ledger.as_ref(), self.gateway.as_ref(), &member).await?;

        // 3. Create the subscription at the gateway
        let now = Timestamp::now();
        let next_due_date = now.add_days(self.terms.due_date_offset_days).date();
        let billing_type = cmd
            .billing_type
            .unwrap_or(self.terms.default_billing_type);

        let remote = self
            .gateway
            .create_subscription(CreateSubscriptionRequest {
                customer_id: customer.gateway_customer_id.clone(),
                billing_type,
                value: self.terms.amount,
                cycle: self.terms.cycle,
                next_due_date,
                description: format!("Mensalidade - {}", member.name),
                external_reference: member.id.to_string(),
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    operation = "create_subscription",
                    member_id = %member.id,
                    error = %e,
                    "Gateway subscription creation failed"
                );
                BillingError::from(e)
            })?;

        // 4. Persist locally
        let subscription = Subscription::new(
            NewSubscription {
                member_id: member.id,
                gateway_subscription_id: remote.id.clone(),
                gateway_customer_id: customer.gateway_customer_id,
                amount: self.terms.amount,
                cycle: self.terms.cycle,
                billing_type,
                next_due_date: remote.next_due_date,
            },
            now,
        )?;

        if let Err(e) = self.ledger.insert_subscription(&subscription).await {
            self.release_remote_subscription(&remote.id, member.id).await;
            return Err(if e.code == ErrorCode::AlreadySubscribed {
                BillingError::AlreadySubscribed(member.id)
            } else {
                e.into()
            });
        }

        tracing::info!(
            member_id = %member.id,
            subscription_id = %subscription.id,
            gateway_subscription_id = %subscription.gateway_subscription_id,
            amount = %subscription.amount,
            next_due_date = %subscription.next_due_date,
            "Dues subscription created"
        );

        Ok(subscription)
    }

    async fn release_remote_subscription(&self, gateway_subscription_id: &str, member_id: MemberId) {
        if let Err(e) = self.gateway.cancel_subscription(gateway_subscription_id).await {
            tracing::error!(
                operation = "cancel_subscription",
                member_id = %member_id,
                gateway_subscription_id,
                error = %e,
                "Could not release gateway subscription after local insert failed"
            );
        }
    }
}
