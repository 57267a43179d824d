//! Ledger store port.
//!
//! Durable home of gateway customers, subscriptions, payments and the
//! financial ledger. Every status change goes through
//! [`LedgerStore::apply_payment_transition`] or
//! [`LedgerStore::apply_subscription_transition`], which serialize writers
//! per row and persist side effects in the same transaction.
//!
//! # Locking
//!
//! Implementations hold a lock scoped to the target row for the whole
//! read-modify-write. A writer that cannot get the lock within the
//! configured wait fails with `ErrorCode::Conflict` and leaves no trace.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::billing::{
    FinancialSummary, FinancialTransaction, GatewayCustomer, Payment, PaymentEffects,
    PaymentStatus, Subscription, SubscriptionStatus, SummaryPeriod, Transition,
    TransitionSource,
};
use crate::domain::foundation::{DomainError, MemberId, PaymentId, SubscriptionId, Timestamp};

/// Payment state after a transition attempt, plus what was persisted with it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub payment: Payment,
    pub effects: PaymentEffects,
    /// The registration was flagged as paid by this transition.
    pub registration_settled: bool,
}

/// Subscription state after a transition attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub subscription: Subscription,
    pub transition: Transition<SubscriptionStatus>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ── Customers ─────────────────────────────────────────────────────────

    async fn find_customer(&self, member_id: MemberId)
        -> Result<Option<GatewayCustomer>, DomainError>;

    /// Stores the member's gateway customer.
    ///
    /// If a customer already exists for the member, the stored row wins
    /// and is returned unchanged.
    async fn save_customer(&self, customer: &GatewayCustomer)
        -> Result<GatewayCustomer, DomainError>;

    // ── Subscriptions ─────────────────────────────────────────────────────

    /// # Errors
    ///
    /// - `AlreadySubscribed` if the member already has an ACTIVE subscription
    /// - `DatabaseError` on persistence failure
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), DomainError>;

    async fn find_subscription(&self, id: SubscriptionId)
        -> Result<Option<Subscription>, DomainError>;

    async fn find_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    async fn find_active_subscription(
        &self,
        member_id: MemberId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Locks the subscription, decides the transition and persists it.
    ///
    /// Returns `None` if no subscription carries this gateway id.
    async fn apply_subscription_transition(
        &self,
        gateway_subscription_id: &str,
        target: SubscriptionStatus,
        at: Timestamp,
    ) -> Result<Option<SubscriptionUpdate>, DomainError>;

    // ── Payments ──────────────────────────────────────────────────────────

    /// Inserts a payment, keyed by its gateway id.
    ///
    /// If the gateway id is already known the stored payment is returned
    /// and the argument is discarded.
    async fn insert_payment(&self, payment: &Payment) -> Result<Payment, DomainError>;

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>, DomainError>;

    async fn find_payment_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError>;

    /// Charges of one split payment, earliest due date first.
    async fn find_payments_by_installment(
        &self,
        gateway_installment_id: &str,
    ) -> Result<Vec<Payment>, DomainError>;

    /// Newest first.
    async fn list_payments_for_member(&self, member_id: MemberId)
        -> Result<Vec<Payment>, DomainError>;

    /// PENDING or CONFIRMED payments due on or before `due_on_or_before`,
    /// oldest due date first.
    async fn find_stale_payments(
        &self,
        due_on_or_before: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError>;

    /// Locks the payment, decides the transition and persists it together
    /// with its effects: payment date, income line and registration
    /// settlement all commit or none do. A registration paid in
    /// installments is settled only when every installment is RECEIVED.
    ///
    /// Returns `None` if no payment carries this gateway id.
    async fn apply_payment_transition(
        &self,
        gateway_payment_id: &str,
        target: PaymentStatus,
        source: &TransitionSource,
        at: Timestamp,
    ) -> Result<Option<PaymentUpdate>, DomainError>;

    // ── Ledger ────────────────────────────────────────────────────────────

    async fn record_transaction(&self, transaction: &FinancialTransaction)
        -> Result<(), DomainError>;

    async fn transactions_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<FinancialTransaction>, DomainError>;

    async fn financial_summary(&self, period: SummaryPeriod)
        -> Result<FinancialSummary, DomainError>;
}
