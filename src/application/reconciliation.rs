//! ReconciliationSweep - Background job that recovers lost webhooks.
//!
//! Payments still PENDING or CONFIRMED some days after their due date are
//! re-read from the gateway, and the authoritative status is applied through
//! the same locked transition the webhook processor uses. A settlement found
//! this way books income exactly like a `payment-received` webhook would;
//! the webhook arriving later finds the payment already RECEIVED and is a
//! no-op.
//!
//! The sweep only reads from the gateway. It never creates or changes
//! gateway resources.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 15min | Time between passes |
//! | `grace_days` | 3 | Days past due before a payment is examined |
//! | `batch_size` | 100 | Max payments examined per pass |

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use tokio::sync::watch;
use tokio::time;

use crate::domain::billing::{Payment, Transition, TransitionSource};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{LedgerStore, PaymentGateway};

/// Configuration for the reconciliation sweep.
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub interval: Duration,
    pub grace_days: u64,
    pub batch_size: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            grace_days: 3,
            batch_size: 100,
        }
    }
}

impl ReconciliationConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_grace_days(mut self, days: u64) -> Self {
        self.grace_days = days;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }
}

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale payments looked up at the gateway.
    pub examined: usize,
    /// Payments whose status moved.
    pub advanced: usize,
    /// Gateway agrees with the local status, or reports one with no local
    /// counterpart.
    pub unchanged: usize,
    /// Payment missing at the gateway or transition rejected.
    pub anomalies: usize,
    /// Gateway or lock failures; retried next pass.
    pub failures: usize,
}

enum Examined {
    Advanced,
    Unchanged,
    Anomaly,
    Failed,
}

pub struct ReconciliationSweep {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: ReconciliationConfig,
}

impl ReconciliationSweep {
    pub fn new(ledger: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::with_config(ledger, gateway, ReconciliationConfig::default())
    }

    pub fn with_config(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            ledger,
            gateway,
            config,
        }
    }

    /// Runs a pass every `interval` until the shutdown flag flips to true.
    ///
    /// A failed pass is logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            grace_days = self.config.grace_days,
            "Reconciliation sweep started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Reconciliation sweep stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once(Timestamp::now().date()).await {
                        tracing::error!(error = %e, "Reconciliation pass failed");
                    }
                }
            }
        }
    }

    /// Examines one batch of stale payments as of `today`.
    pub async fn sweep_once(&self, today: NaiveDate) -> Result<SweepReport, DomainError> {
        let cutoff = today
            .checked_sub_days(Days::new(self.config.grace_days))
            .unwrap_or(NaiveDate::MIN);
        let stale = self
            .ledger
            .find_stale_payments(cutoff, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for payment in &stale {
            report.examined += 1;
            match self.reconcile(payment).await {
                Examined::Advanced => report.advanced += 1,
                Examined::Unchanged => report.unchanged += 1,
                Examined::Anomaly => report.anomalies += 1,
                Examined::Failed => report.failures += 1,
            }
        }

        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                advanced = report.advanced,
                unchanged = report.unchanged,
                anomalies = report.anomalies,
                failures = report.failures,
                "Reconciliation pass complete"
            );
        }
        Ok(report)
    }

    async fn reconcile(&self, payment: &Payment) -> Examined {
        let gateway_payment_id = payment.gateway_payment_id.as_str();

        let remote = match self.gateway.get_payment(gateway_payment_id).await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    gateway_payment_id,
                    "Anomaly: payment unknown at gateway"
                );
                return Examined::Anomaly;
            }
            Err(e) => {
                tracing::warn!(
                    operation = "get_payment",
                    payment_id = %payment.id,
                    member_id = %payment.member_id,
                    gateway_payment_id,
                    error = %e,
                    "Gateway lookup failed during reconciliation"
                );
                return Examined::Failed;
            }
        };

        let Some(target) = remote.local_status() else {
            tracing::debug!(
                gateway_payment_id,
                gateway_status = %remote.status,
                "Gateway status has no local counterpart, skipping"
            );
            return Examined::Unchanged;
        };

        let update = match self
            .ledger
            .apply_payment_transition(
                gateway_payment_id,
                target,
                &TransitionSource::Reconciliation,
                Timestamp::now(),
            )
            .await
        {
            Ok(Some(update)) => update,
            Ok(None) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    gateway_payment_id,
                    "Anomaly: payment vanished from the ledger during reconciliation"
                );
                return Examined::Anomaly;
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    gateway_payment_id,
                    error = %e,
                    "Reconciliation transition failed"
                );
                return Examined::Failed;
            }
        };

        match update.effects.transition {
            Transition::Applied { from, to } => {
                tracing::info!(
                    payment_id = %update.payment.id,
                    member_id = %update.payment.member_id,
                    gateway_payment_id,
                    from = %from,
                    to = %to,
                    income_recorded = update.effects.income.is_some(),
                    "Reconciliation advanced payment"
                );
                Examined::Advanced
            }
            Transition::Unchanged(_) => Examined::Unchanged,
            Transition::Rejected { current, requested } => {
                tracing::warn!(
                    payment_id = %update.payment.id,
                    gateway_payment_id,
                    current = %current,
                    requested = %requested,
                    "Anomaly: gateway status not reachable from local status"
                );
                Examined::Anomaly
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateway::MockPaymentGateway;
    use crate::adapters::memory::InMemoryLedgerStore;
    use crate::domain::billing::{
        BillingType, FinancialSummary, FinancialTransaction, GatewayCustomer, NewPayment,
        PaymentArtifacts, PaymentStatus, Subscription, SubscriptionStatus, SummaryPeriod,
    };
    use crate::domain::foundation::{MemberId, PaymentId, RegistrationId, SubscriptionId};
    use crate::ports::{CreatePaymentRequest, GatewayError, PaymentUpdate, SubscriptionUpdate};
    use rust_decimal::Decimal;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    struct Fixture {
        sweep: ReconciliationSweep,
        ledger: Arc<InMemoryLedgerStore>,
        gateway: MockPaymentGateway,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let gateway = MockPaymentGateway::new();
        let sweep = ReconciliationSweep::with_config(
            ledger.clone(),
            Arc::new(gateway.clone()),
            ReconciliationConfig::default().with_grace_days(3),
        );
        Fixture {
            sweep,
            ledger,
            gateway,
        }
    }

    /// Issues a charge at the mock gateway and records it locally.
    async fn charge(fx: &Fixture, due_date: NaiveDate) -> Payment {
        let remote = fx
            .gateway
            .create_payment(CreatePaymentRequest {
                customer_id: "cus_1".to_string(),
                billing_type: BillingType::Boleto,
                value: Decimal::new(1000, 2),
                due_date,
                description: "Taxa".to_string(),
                external_reference: None,
                installment_count: None,
            })
            .await
            .unwrap();
        let payment = Payment::new(
            NewPayment {
                member_id: MemberId::new(),
                subscription_id: None,
                registration_id: Some(RegistrationId::new()),
                gateway_payment_id: remote.id,
                amount: Decimal::new(1000, 2),
                net_amount: None,
                billing_type: BillingType::Boleto,
                description: None,
                due_date,
                artifacts: PaymentArtifacts::default(),
            },
            Timestamp::now(),
        )
        .unwrap();
        fx.ledger.insert_payment(&payment).await.unwrap()
    }

    #[tokio::test]
    async fn settles_payment_received_at_gateway() {
        let fx = fixture();
        let payment = charge(&fx, date(3, 1)).await;
        fx.gateway.simulate_status(&payment.gateway_payment_id, "RECEIVED");

        let report = fx.sweep.sweep_once(date(3, 11)).await.unwrap();

        assert_eq!(report.examined, 1);
        assert_eq!(report.advanced, 1);
        let stored = fx.ledger.find_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Received);
        assert_eq!(fx.ledger.all_transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn payments_inside_grace_window_are_not_examined() {
        let fx = fixture();
        charge(&fx, date(3, 10)).await;

        let report = fx.sweep.sweep_once(date(3, 11)).await.unwrap();

        assert_eq!(report.examined, 0);
        assert!(!fx.gateway.was_called("get_payment"));
    }

    #[tokio::test]
    async fn still_pending_at_gateway_is_unchanged() {
        let fx = fixture();
        charge(&fx, date(3, 1)).await;

        let report = fx.sweep.sweep_once(date(3, 11)).await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.advanced, 0);
    }

    #[tokio::test]
    async fn overdue_at_gateway_moves_payment_out_of_the_sweep() {
        let fx = fixture();
        let payment = charge(&fx, date(3, 1)).await;
        fx.gateway.simulate_status(&payment.gateway_payment_id, "OVERDUE");

        fx.sweep.sweep_once(date(3, 11)).await.unwrap();
        let second = fx.sweep.sweep_once(date(3, 12)).await.unwrap();

        assert_eq!(second.examined, 0);
        assert!(fx.ledger.all_transactions().await.is_empty());
    }

    #[tokio::test]
    async fn unmapped_gateway_status_is_skipped() {
        let fx = fixture();
        let payment = charge(&fx, date(3, 1)).await;
        fx.gateway
            .simulate_status(&payment.gateway_payment_id, "REFUND_REQUESTED");

        let report = fx.sweep.sweep_once(date(3, 11)).await.unwrap();

        assert_eq!(report.unchanged, 1);
        let stored = fx.ledger.find_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn gateway_failure_is_counted_and_retried_next_pass() {
        let fx = fixture();
        let payment = charge(&fx, date(3, 1)).await;
        fx.gateway.simulate_status(&payment.gateway_payment_id, "RECEIVED");
        fx.gateway
            .set_method_error("get_payment", GatewayError::timeout("timed out"));

        let failed = fx.sweep.sweep_once(date(3, 11)).await.unwrap();
        assert_eq!(failed.failures, 1);

        fx.gateway.clear_errors();
        let retried = fx.sweep.sweep_once(date(3, 11)).await.unwrap();
        assert_eq!(retried.advanced, 1);
    }

    /// Ledger whose payments disappear between the stale query and the
    /// locked transition.
    struct VanishingLedger(Arc<InMemoryLedgerStore>);

    #[async_trait::async_trait]
    impl LedgerStore for VanishingLedger {
        async fn find_customer(
            &self,
            member_id: MemberId,
        ) -> Result<Option<GatewayCustomer>, DomainError> {
            self.0.find_customer(member_id).await
        }
        async fn save_customer(
            &self,
            customer: &GatewayCustomer,
        ) -> Result<GatewayCustomer, DomainError> {
            self.0.save_customer(customer).await
        }
        async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), DomainError> {
            self.0.insert_subscription(subscription).await
        }
        async fn find_subscription(
            &self,
            id: SubscriptionId,
        ) -> Result<Option<Subscription>, DomainError> {
            self.0.find_subscription(id).await
        }
        async fn find_subscription_by_gateway_id(
            &self,
            gateway_subscription_id: &str,
        ) -> Result<Option<Subscription>, DomainError> {
            self.0.find_subscription_by_gateway_id(gateway_subscription_id).await
        }
        async fn find_active_subscription(
            &self,
            member_id: MemberId,
        ) -> Result<Option<Subscription>, DomainError> {
            self.0.find_active_subscription(member_id).await
        }
        async fn apply_subscription_transition(
            &self,
            gateway_subscription_id: &str,
            target: SubscriptionStatus,
            at: Timestamp,
        ) -> Result<Option<SubscriptionUpdate>, DomainError> {
            self.0
                .apply_subscription_transition(gateway_subscription_id, target, at)
                .await
        }
        async fn insert_payment(&self, payment: &Payment) -> Result<Payment, DomainError> {
            self.0.insert_payment(payment).await
        }
        async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
            self.0.find_payment(id).await
        }
        async fn find_payment_by_gateway_id(
            &self,
            gateway_payment_id: &str,
        ) -> Result<Option<Payment>, DomainError> {
            self.0.find_payment_by_gateway_id(gateway_payment_id).await
        }
        async fn find_payments_by_installment(
            &self,
            gateway_installment_id: &str,
        ) -> Result<Vec<Payment>, DomainError> {
            self.0.find_payments_by_installment(gateway_installment_id).await
        }
        async fn list_payments_for_member(
            &self,
            member_id: MemberId,
        ) -> Result<Vec<Payment>, DomainError> {
            self.0.list_payments_for_member(member_id).await
        }
        async fn find_stale_payments(
            &self,
            due_on_or_before: NaiveDate,
            limit: u32,
        ) -> Result<Vec<Payment>, DomainError> {
            self.0.find_stale_payments(due_on_or_before, limit).await
        }
        async fn apply_payment_transition(
            &self,
            _gateway_payment_id: &str,
            _target: PaymentStatus,
            _source: &TransitionSource,
            _at: Timestamp,
        ) -> Result<Option<PaymentUpdate>, DomainError> {
            Ok(None)
        }
        async fn record_transaction(
            &self,
            transaction: &FinancialTransaction,
        ) -> Result<(), DomainError> {
            self.0.record_transaction(transaction).await
        }
        async fn transactions_for_payment(
            &self,
            payment_id: PaymentId,
        ) -> Result<Vec<FinancialTransaction>, DomainError> {
            self.0.transactions_for_payment(payment_id).await
        }
        async fn financial_summary(
            &self,
            period: SummaryPeriod,
        ) -> Result<FinancialSummary, DomainError> {
            self.0.financial_summary(period).await
        }
    }

    #[tokio::test]
    async fn payment_vanishing_mid_pass_is_an_anomaly() {
        let fx = fixture();
        let payment = charge(&fx, date(3, 1)).await;
        fx.gateway.simulate_status(&payment.gateway_payment_id, "RECEIVED");
        let sweep = ReconciliationSweep::new(
            Arc::new(VanishingLedger(fx.ledger.clone())),
            Arc::new(fx.gateway.clone()),
        );

        let report = sweep.sweep_once(date(3, 11)).await.unwrap();

        assert_eq!(report.examined, 1);
        assert_eq!(report.anomalies, 1);
        assert_eq!(report.advanced, 0);
        assert!(fx.ledger.all_transactions().await.is_empty());
    }

    #[tokio::test]
    async fn payment_missing_at_gateway_is_an_anomaly() {
        let fx = fixture();
        let payment = Payment::new(
            NewPayment {
                member_id: MemberId::new(),
                subscription_id: None,
                registration_id: None,
                gateway_payment_id: "pay_ghost".to_string(),
                amount: Decimal::new(1000, 2),
                net_amount: None,
                billing_type: BillingType::Pix,
                description: None,
                due_date: date(1, 1),
                artifacts: PaymentArtifacts::default(),
            },
            Timestamp::now(),
        )
        .unwrap();
        fx.ledger.insert_payment(&payment).await.unwrap();

        let report = fx.sweep.sweep_once(date(3, 11)).await.unwrap();

        assert_eq!(report.anomalies, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let fx = fixture();
        let (tx, rx) = watch::channel(false);
        let sweep = Arc::new(fx.sweep);
        let task = {
            let sweep = sweep.clone();
            tokio::spawn(async move { sweep.run(rx).await })
        };

        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("sweep did not stop")
            .unwrap();
    }
}
