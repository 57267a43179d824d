//! CreateEventPaymentHandler - Command handler for one-off event fee charges.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::billing::{
    BillingError, BillingType, InstallmentPlan, NewPayment, Payment, PaymentArtifacts,
    RequestContext,
};
use crate::domain::foundation::{MemberId, RegistrationId, Timestamp, ValidationError};
use crate::ports::{
    CreatePaymentRequest, GatewayPayment, LedgerStore, MemberDirectory, PaymentGateway,
};

use super::gateway_customer::ensure_gateway_customer;

/// Command to charge a member for an event registration.
#[derive(Debug, Clone)]
pub struct CreateEventPaymentCommand {
    pub ctx: RequestContext,
    pub member_id: MemberId,
    pub registration_id: RegistrationId,
    pub amount: Decimal,
    pub billing_type: BillingType,
    pub due_date: NaiveDate,
    pub description: String,
    /// Split the charge; only billing types with installment support accept
    /// more than one.
    pub installment_count: Option<u8>,
}

pub type CreateEventPaymentResult = Payment;

/// Handler for creating event fee charges.
///
/// The local payment is written only after the gateway issued the charge.
/// A split charge is recorded as one payment per installment, each for its
/// own value; the first installment is returned.
/// For PIX-capable charges the copy-and-paste code is fetched right away;
/// a failure there does not fail the charge, the code can be fetched later.
pub struct CreateEventPaymentHandler {
    members: Arc<dyn MemberDirectory>,
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CreateEventPaymentHandler {
    pub fn new(
        members: Arc<dyn MemberDirectory>,
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            members,
            ledger,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateEventPaymentCommand,
    ) -> Result<CreateEventPaymentResult, BillingError> {
        cmd.ctx.require_self_or_admin(cmd.member_id)?;

        // 1. Validate before any gateway call
        if cmd.amount <= Decimal::ZERO {
            return Err(ValidationError::not_positive("amount", cmd.amount).into());
        }
        if cmd.description.trim().is_empty() {
            return Err(ValidationError::empty_field("description").into());
        }
        if let Some(count) = cmd.installment_count {
            cmd.billing_type.validate_installments(count)?;
        }

        let member = self
            .members
            .find_member(cmd.member_id)
            .await?
            .ok_or(BillingError::MemberNotFound(cmd.member_id))?;

        // 2. Issue the charge
        let customer =
            ensure_gateway_customer(self.ledger.as_ref(), self.gateway.as_ref(), &member).await?;

        let remote = self
            .gateway
            .create_payment(CreatePaymentRequest {
                customer_id: customer.gateway_customer_id,
                billing_type: cmd.billing_type,
                value: cmd.amount,
                due_date: cmd.due_date,
                description: cmd.description.clone(),
                external_reference: Some(cmd.registration_id.to_string()),
                installment_count: cmd.installment_count,
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    operation = "create_payment",
                    member_id = %member.id,
                    registration_id = %cmd.registration_id,
                    error = %e,
                    "Gateway charge creation failed"
                );
                BillingError::from(e)
            })?;

        let mut artifacts = remote.artifacts();
        if remote.billing_type.capabilities().pix_qr_code {
            match self.gateway.get_pix_qr_code(&remote.id).await {
                Ok(qr) => artifacts.pix_code = Some(qr.payload),
                Err(e) => tracing::warn!(
                    operation = "get_pix_qr_code",
                    member_id = %member.id,
                    gateway_payment_id = %remote.id,
                    error = %e,
                    "PIX code unavailable, charge kept without it"
                ),
            }
        }

        // 3. Record locally, one payment per installment
        let plan = self.installment_plan(&cmd, &remote);
        let siblings = match &plan {
            Some(plan) => self.remaining_installments(plan, &remote).await,
            None => Vec::new(),
        };

        let now = Timestamp::now();
        let first = self.record_charge(&cmd, member.id, remote, artifacts, plan.clone(), now)?;
        let stored = self.ledger.insert_payment(&first).await?;

        for sibling in siblings {
            let artifacts = sibling.artifacts();
            let payment = self.record_charge(&cmd, member.id, sibling, artifacts, plan.clone(), now)?;
            self.ledger.insert_payment(&payment).await?;
        }

        tracing::info!(
            member_id = %stored.member_id,
            payment_id = %stored.id,
            gateway_payment_id = %stored.gateway_payment_id,
            amount = %stored.amount,
            installments = stored.installments_expected(),
            billing_type = %stored.billing_type,
            "Event fee charge created"
        );

        Ok(stored)
    }

    fn installment_plan(
        &self,
        cmd: &CreateEventPaymentCommand,
        remote: &GatewayPayment,
    ) -> Option<InstallmentPlan> {
        let count = cmd.installment_count.filter(|count| *count > 1)?;
        match &remote.installment_id {
            Some(id) => Some(InstallmentPlan {
                gateway_installment_id: id.clone(),
                count,
            }),
            None => {
                tracing::warn!(
                    gateway_payment_id = %remote.id,
                    requested = count,
                    "Gateway issued a single charge for a split payment"
                );
                None
            }
        }
    }

    /// The other charges of the split. Any the listing misses are recorded
    /// when their webhook arrives.
    async fn remaining_installments(
        &self,
        plan: &InstallmentPlan,
        first: &GatewayPayment,
    ) -> Vec<GatewayPayment> {
        match self
            .gateway
            .list_installment_payments(&plan.gateway_installment_id)
            .await
        {
            Ok(charges) => charges.into_iter().filter(|c| c.id != first.id).collect(),
            Err(e) => {
                tracing::warn!(
                    operation = "list_installment_payments",
                    installment_id = %plan.gateway_installment_id,
                    error = %e,
                    "Installment listing failed; later installments wait for their webhooks"
                );
                Vec::new()
            }
        }
    }

    fn record_charge(
        &self,
        cmd: &CreateEventPaymentCommand,
        member_id: MemberId,
        charge: GatewayPayment,
        artifacts: PaymentArtifacts,
        plan: Option<InstallmentPlan>,
        now: Timestamp,
    ) -> Result<Payment, BillingError> {
        let payment = Payment::new(
            NewPayment {
                member_id,
                subscription_id: None,
                registration_id: Some(cmd.registration_id),
                gateway_payment_id: charge.id,
                amount: charge.value,
                net_amount: charge.net_value,
                billing_type: charge.billing_type,
                description: Some(cmd.description.clone()),
                due_date: charge.due_date,
                artifacts,
            },
            now,
        )?;
        Ok(match plan {
            Some(plan) => payment.with_installment(plan),
            None => payment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateway::MockPaymentGateway;
    use crate::adapters::memory::{InMemoryLedgerStore, InMemoryMemberDirectory};
    use crate::domain::billing::{MemberProfile, PaymentStatus, Rank};
    use crate::ports::GatewayError;

    struct Fixture {
        handler: CreateEventPaymentHandler,
        ledger: Arc<InMemoryLedgerStore>,
        gateway: MockPaymentGateway,
        member_id: MemberId,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let gateway = MockPaymentGateway::new();
        let members = Arc::new(InMemoryMemberDirectory::new());
        let member_id = MemberId::new();
        members
            .insert(MemberProfile {
                id: member_id,
                name: "Rafael Costa".to_string(),
                email: "rafael@example.com".to_string(),
                tax_id: "11144477735".to_string(),
                phone: None,
                // Event fees are open to every rank.
                rank: Rank::Recruta,
            })
            .await;
        let handler =
            CreateEventPaymentHandler::new(members, ledger.clone(), Arc::new(gateway.clone()));
        Fixture {
            handler,
            ledger,
            gateway,
            member_id,
        }
    }

    fn command(fx: &Fixture, billing_type: BillingType) -> CreateEventPaymentCommand {
        CreateEventPaymentCommand {
            ctx: RequestContext::member(fx.member_id),
            member_id: fx.member_id,
            registration_id: RegistrationId::new(),
            amount: Decimal::new(15000, 2),
            billing_type,
            due_date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            description: "Encontro regional".to_string(),
            installment_count: None,
        }
    }

    #[tokio::test]
    async fn pix_charge_stores_pix_code() {
        let fx = fixture().await;

        let payment = fx.handler.handle(command(&fx, BillingType::Pix)).await.unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount.to_string(), "150.00");
        assert!(payment.is_event_fee());
        assert!(payment.artifacts.pix_code.is_some());
        assert_eq!(fx.ledger.payment_count().await, 1);
    }

    #[tokio::test]
    async fn pix_code_failure_is_not_fatal() {
        let fx = fixture().await;
        fx.gateway
            .set_method_error("get_pix_qr_code", GatewayError::non_success(503, "busy"));

        let payment = fx.handler.handle(command(&fx, BillingType::Pix)).await.unwrap();

        assert!(payment.artifacts.pix_code.is_none());
        assert_eq!(fx.ledger.payment_count().await, 1);
    }

    #[tokio::test]
    async fn boleto_charge_skips_pix_lookup() {
        let fx = fixture().await;

        fx.handler.handle(command(&fx, BillingType::Boleto)).await.unwrap();

        assert!(!fx.gateway.was_called("get_pix_qr_code"));
    }

    #[tokio::test]
    async fn pix_cannot_be_split() {
        let fx = fixture().await;
        let cmd = CreateEventPaymentCommand {
            installment_count: Some(3),
            ..command(&fx, BillingType::Pix)
        };

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, BillingError::ValidationFailed { ref field, .. } if field == "installment_count"));
        assert!(fx.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn credit_card_accepts_installments() {
        let fx = fixture().await;
        let cmd = CreateEventPaymentCommand {
            installment_count: Some(3),
            ..command(&fx, BillingType::CreditCard)
        };

        let payment = fx.handler.handle(cmd).await.unwrap();

        assert_eq!(payment.billing_type, BillingType::CreditCard);
        assert_eq!(payment.amount, Decimal::new(5000, 2));
        assert_eq!(payment.installments_expected(), 3);
        assert_eq!(fx.ledger.payment_count().await, 3);

        let plan = payment.installment.unwrap();
        let recorded = fx
            .ledger
            .find_payments_by_installment(&plan.gateway_installment_id)
            .await
            .unwrap();
        assert_eq!(
            recorded.iter().map(|p| p.amount).sum::<Decimal>(),
            Decimal::new(15000, 2)
        );
        assert!(recorded
            .iter()
            .all(|p| p.registration_id == payment.registration_id));
    }

    #[tokio::test]
    async fn installment_listing_failure_keeps_first_charge() {
        let fx = fixture().await;
        fx.gateway.set_method_error(
            "list_installment_payments",
            GatewayError::non_success(500, "boom"),
        );
        let cmd = CreateEventPaymentCommand {
            installment_count: Some(3),
            ..command(&fx, BillingType::CreditCard)
        };

        let payment = fx.handler.handle(cmd).await.unwrap();

        assert_eq!(payment.installments_expected(), 3);
        assert_eq!(fx.ledger.payment_count().await, 1);
    }

    #[tokio::test]
    async fn gateway_outage_writes_nothing() {
        let fx = fixture().await;
        fx.gateway
            .set_method_error("create_payment", GatewayError::timeout("timed out"));

        let err = fx.handler.handle(command(&fx, BillingType::Boleto)).await.unwrap_err();

        assert!(matches!(err, BillingError::GatewayUnavailable(_)));
        assert_eq!(fx.ledger.payment_count().await, 0);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let fx = fixture().await;
        let cmd = CreateEventPaymentCommand {
            amount: Decimal::ZERO,
            ..command(&fx, BillingType::Boleto)
        };

        let err = fx.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, BillingError::ValidationFailed { .. }));
    }
}
