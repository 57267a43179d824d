//! In-memory ledger store.
//!
//! Used by tests and local runs. Row locks come from [`KeyedLocks`]; all
//! writes belonging to one transition happen under a single write guard,
//! so readers never observe half of a settlement.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::domain::billing::{
    FinancialSummary, FinancialTransaction, GatewayCustomer, Payment, PaymentStatus, Subscription,
    SubscriptionStatus, SummaryPeriod, TransitionSource,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, MemberId, PaymentId, RegistrationId, SubscriptionId, Timestamp,
};
use crate::ports::{LedgerStore, PaymentUpdate, SubscriptionUpdate};

use super::{KeyedLockGuard, KeyedLocks};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct LedgerState {
    customers: HashMap<MemberId, GatewayCustomer>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    payments: HashMap<PaymentId, Payment>,
    payments_by_gateway_id: HashMap<String, PaymentId>,
    transactions: Vec<FinancialTransaction>,
    paid_registrations: HashSet<RegistrationId>,
}

impl LedgerState {
    fn payment_by_gateway_id(&self, gateway_payment_id: &str) -> Option<&Payment> {
        self.payments_by_gateway_id
            .get(gateway_payment_id)
            .and_then(|id| self.payments.get(id))
    }

    fn received_for_registration(&self, registration_id: RegistrationId) -> usize {
        self.payments
            .values()
            .filter(|p| {
                p.registration_id == Some(registration_id) && p.status == PaymentStatus::Received
            })
            .count()
    }

    fn subscription_by_gateway_id(&self, gateway_subscription_id: &str) -> Option<&Subscription> {
        self.subscriptions
            .values()
            .find(|s| s.gateway_subscription_id == gateway_subscription_id)
    }
}

pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
    row_locks: KeyedLocks,
    lock_timeout: Duration,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            row_locks: KeyedLocks::new(),
            lock_timeout,
        }
    }

    /// Holds the payment's row lock until the returned guard is dropped.
    pub async fn lock_payment(
        &self,
        gateway_payment_id: &str,
    ) -> Result<KeyedLockGuard, DomainError> {
        self.row_locks
            .acquire(&payment_key(gateway_payment_id), self.lock_timeout)
            .await
    }

    pub async fn all_transactions(&self) -> Vec<FinancialTransaction> {
        self.state.read().await.transactions.clone()
    }

    pub async fn is_registration_paid(&self, registration_id: RegistrationId) -> bool {
        self.state
            .read()
            .await
            .paid_registrations
            .contains(&registration_id)
    }

    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }
}

fn payment_key(gateway_payment_id: &str) -> String {
    format!("payment:{}", gateway_payment_id)
}

fn subscription_key(gateway_subscription_id: &str) -> String {
    format!("subscription:{}", gateway_subscription_id)
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_customer(
        &self,
        member_id: MemberId,
    ) -> Result<Option<GatewayCustomer>, DomainError> {
        Ok(self.state.read().await.customers.get(&member_id).cloned())
    }

    async fn save_customer(
        &self,
        customer: &GatewayCustomer,
    ) -> Result<GatewayCustomer, DomainError> {
        let mut state = self.state.write().await;
        let stored = state
            .customers
            .entry(customer.member_id)
            .or_insert_with(|| customer.clone());
        Ok(stored.clone())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        let already_active = state
            .subscriptions
            .values()
            .any(|s| s.member_id == subscription.member_id && s.is_active());
        if already_active && subscription.is_active() {
            return Err(DomainError::new(
                ErrorCode::AlreadySubscribed,
                format!("member {} already has an active subscription", subscription.member_id),
            ));
        }
        if state
            .subscription_by_gateway_id(&subscription.gateway_subscription_id)
            .is_some()
        {
            return Err(DomainError::database(format!(
                "duplicate gateway subscription id {}",
                subscription.gateway_subscription_id
            )));
        }
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self.state.read().await.subscriptions.get(&id).cloned())
    }

    async fn find_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .subscription_by_gateway_id(gateway_subscription_id)
            .cloned())
    }

    async fn find_active_subscription(
        &self,
        member_id: MemberId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .values()
            .find(|s| s.member_id == member_id && s.is_active())
            .cloned())
    }

    async fn apply_subscription_transition(
        &self,
        gateway_subscription_id: &str,
        target: SubscriptionStatus,
        at: Timestamp,
    ) -> Result<Option<SubscriptionUpdate>, DomainError> {
        let _row = self
            .row_locks
            .acquire(&subscription_key(gateway_subscription_id), self.lock_timeout)
            .await?;

        let mut state = self.state.write().await;
        let Some(current) = state.subscription_by_gateway_id(gateway_subscription_id) else {
            return Ok(None);
        };
        let mut subscription = current.clone();
        let transition = subscription.apply_transition(target, at);
        if transition.is_applied() {
            state
                .subscriptions
                .insert(subscription.id, subscription.clone());
        }

        Ok(Some(SubscriptionUpdate {
            subscription,
            transition,
        }))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<Payment, DomainError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.payment_by_gateway_id(&payment.gateway_payment_id) {
            return Ok(existing.clone());
        }
        state
            .payments_by_gateway_id
            .insert(payment.gateway_payment_id.clone(), payment.id);
        state.payments.insert(payment.id, payment.clone());
        Ok(payment.clone())
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.state.read().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .payment_by_gateway_id(gateway_payment_id)
            .cloned())
    }

    async fn find_payments_by_installment(
        &self,
        gateway_installment_id: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| {
                p.installment
                    .as_ref()
                    .is_some_and(|plan| plan.gateway_installment_id == gateway_installment_id)
            })
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(payments)
    }

    async fn list_payments_for_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<Payment>, DomainError> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.member_id == member_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn find_stale_payments(
        &self,
        due_on_or_before: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError> {
        let state = self.state.read().await;
        let mut stale: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| {
                matches!(p.status, PaymentStatus::Pending | PaymentStatus::Confirmed)
                    && p.due_date <= due_on_or_before
            })
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn apply_payment_transition(
        &self,
        gateway_payment_id: &str,
        target: PaymentStatus,
        source: &TransitionSource,
        at: Timestamp,
    ) -> Result<Option<PaymentUpdate>, DomainError> {
        let _row = self.lock_payment(gateway_payment_id).await?;

        let Some(mut payment) = self
            .state
            .read()
            .await
            .payment_by_gateway_id(gateway_payment_id)
            .cloned()
        else {
            return Ok(None);
        };

        let effects = payment.apply_transition(target, source, at);
        let mut registration_settled = false;
        if effects.transition.is_applied() {
            let mut state = self.state.write().await;
            if let Some(income) = &effects.income {
                let already_booked = state
                    .transactions
                    .iter()
                    .any(|t| t.payment_id.is_some() && t.payment_id == income.payment_id);
                if !already_booked {
                    state.transactions.push(income.clone());
                }
            }
            state.payments.insert(payment.id, payment.clone());
            if let Some(registration_id) = effects.settled_registration {
                let received = state.received_for_registration(registration_id);
                if received >= payment.installments_expected() {
                    registration_settled = state.paid_registrations.insert(registration_id);
                }
            }
        }

        Ok(Some(PaymentUpdate {
            payment,
            effects,
            registration_settled,
        }))
    }

    async fn record_transaction(
        &self,
        transaction: &FinancialTransaction,
    ) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if transaction.payment_id.is_some()
            && state
                .transactions
                .iter()
                .any(|t| t.payment_id == transaction.payment_id)
        {
            return Err(DomainError::conflict(format!(
                "payment {:?} already has a ledger line",
                transaction.payment_id
            )));
        }
        state.transactions.push(transaction.clone());
        Ok(())
    }

    async fn transactions_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<FinancialTransaction>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .iter()
            .filter(|t| t.payment_id == Some(payment_id))
            .cloned()
            .collect())
    }

    async fn financial_summary(
        &self,
        period: SummaryPeriod,
    ) -> Result<FinancialSummary, DomainError> {
        let state = self.state.read().await;
        Ok(FinancialSummary::from_transactions(
            &state.transactions,
            period,
        ))
    }
}
