//! MarkPaymentReceivedHandler - Administrative override for cash settlements.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, Payment, PaymentStatus, RequestContext, Transition, TransitionSource,
};
use crate::domain::foundation::{PaymentId, Timestamp};
use crate::ports::LedgerStore;

/// Command to mark a payment as received outside the gateway.
#[derive(Debug, Clone)]
pub struct MarkPaymentReceivedCommand {
    pub ctx: RequestContext,
    pub payment_id: PaymentId,
}

pub type MarkPaymentReceivedResult = Payment;

/// Handler for manual settlement.
///
/// Goes through the same locked transition as webhooks, so the income line
/// is written at most once whichever path settles the payment first.
pub struct MarkPaymentReceivedHandler {
    ledger: Arc<dyn LedgerStore>,
}

impl MarkPaymentReceivedHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn handle(
        &self,
        cmd: MarkPaymentReceivedCommand,
    ) -> Result<MarkPaymentReceivedResult, BillingError> {
        cmd.ctx.require_admin()?;

        let payment = self
            .ledger
            .find_payment(cmd.payment_id)
            .await?
            .ok_or(BillingError::PaymentNotFound(cmd.payment_id))?;

        let source = TransitionSource::Admin {
            member_id: cmd.ctx.member_id,
        };
        let update = self
            .ledger
            .apply_payment_transition(
                &payment.gateway_payment_id,
                PaymentStatus::Received,
                &source,
                Timestamp::now(),
            )
            .await?
            .ok_or(BillingError::PaymentNotFound(cmd.payment_id))?;

        match update.effects.transition {
            Transition::Applied { from, .. } => {
                tracing::info!(
                    payment_id = %update.payment.id,
                    member_id = %update.payment.member_id,
                    admin_id = %cmd.ctx.member_id,
                    from = %from,
                    "Payment marked as received by admin"
                );
                Ok(update.payment)
            }
            Transition::Unchanged(_) => Ok(update.payment),
            Transition::Rejected { current, requested } => {
                tracing::warn!(
                    payment_id = %update.payment.id,
                    admin_id = %cmd.ctx.member_id,
                    current = %current,
                    "Manual settlement rejected"
                );
                Err(BillingError::InvalidTransition { current, requested })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::domain::billing::{BillingType, NewPayment, PaymentArtifacts};
    use crate::domain::foundation::{MemberId, SubscriptionId};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    async fn setup() -> (MarkPaymentReceivedHandler, Arc<InMemoryLedgerStore>, Payment) {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let payment = Payment::new(
            NewPayment {
                member_id: MemberId::new(),
                subscription_id: Some(SubscriptionId::new()),
                registration_id: None,
                gateway_payment_id: "pay_cash".to_string(),
                amount: Decimal::new(1000, 2),
                net_amount: None,
                billing_type: BillingType::Boleto,
                description: None,
                due_date: NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
                artifacts: PaymentArtifacts::default(),
            },
            Timestamp::now(),
        )
        .unwrap();
        let payment = ledger.insert_payment(&payment).await.unwrap();
        (MarkPaymentReceivedHandler::new(ledger.clone()), ledger, payment)
    }

    fn admin_command(payment_id: PaymentId) -> MarkPaymentReceivedCommand {
        MarkPaymentReceivedCommand {
            ctx: RequestContext::admin(MemberId::new()),
            payment_id,
        }
    }

    #[tokio::test]
    async fn admin_settles_pending_payment() {
        let (handler, ledger, payment) = setup().await;

        let settled = handler.handle(admin_command(payment.id)).await.unwrap();

        assert_eq!(settled.status, PaymentStatus::Received);
        let lines = ledger.transactions_for_payment(payment.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].amount, Decimal::new(1000, 2));
    }

    #[tokio::test]
    async fn settling_twice_is_a_no_op() {
        let (handler, ledger, payment) = setup().await;
        handler.handle(admin_command(payment.id)).await.unwrap();

        let again = handler.handle(admin_command(payment.id)).await.unwrap();

        assert_eq!(again.status, PaymentStatus::Received);
        assert_eq!(ledger.all_transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_payment_cannot_be_settled() {
        let (handler, ledger, payment) = setup().await;
        ledger
            .apply_payment_transition(
                "pay_cash",
                PaymentStatus::Cancelled,
                &TransitionSource::Reconciliation,
                Timestamp::now(),
            )
            .await
            .unwrap();

        let err = handler.handle(admin_command(payment.id)).await.unwrap_err();

        assert_eq!(
            err,
            BillingError::InvalidTransition {
                current: PaymentStatus::Cancelled,
                requested: PaymentStatus::Received,
            }
        );
        assert!(ledger.all_transactions().await.is_empty());
    }

    #[tokio::test]
    async fn members_cannot_settle() {
        let (handler, _ledger, payment) = setup().await;

        let err = handler
            .handle(MarkPaymentReceivedCommand {
                ctx: RequestContext::member(payment.member_id),
                payment_id: payment.id,
            })
            .await
            .unwrap_err();

        assert_eq!(err, BillingError::Forbidden);
    }

    #[tokio::test]
    async fn unknown_payment_is_not_found() {
        let (handler, _ledger, _payment) = setup().await;

        let err = handler.handle(admin_command(PaymentId::new())).await.unwrap_err();

        assert!(matches!(err, BillingError::PaymentNotFound(_)));
    }
}
