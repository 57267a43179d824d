//! PostgreSQL implementation of LedgerStore.
//!
//! Status changes run inside one transaction: `SET LOCAL lock_timeout`,
//! `SELECT … FOR UPDATE` on the target row, then the update and its
//! ledger side effects. A lock wait that exceeds the timeout surfaces as
//! `ErrorCode::Conflict`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{
    FinancialSummary, FinancialTransaction, GatewayCustomer, InstallmentPlan, Payment,
    PaymentArtifacts,
    PaymentStatus, Subscription, SubscriptionStatus, SummaryPeriod, TransitionSource,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, MemberId, PaymentId, RegistrationId, SubscriptionId, Timestamp,
    TransactionId,
};
use crate::ports::{LedgerStore, PaymentUpdate, SubscriptionUpdate};

use super::db_error;

const PAYMENT_COLUMNS: &str = "id, member_id, subscription_id, registration_id, \
    gateway_payment_id, amount, net_amount, status, billing_type, description, due_date, \
    payment_date, invoice_url, bank_slip_url, pix_code, gateway_installment_id, \
    installment_count, created_at, updated_at";

const SUBSCRIPTION_COLUMNS: &str = "id, member_id, gateway_subscription_id, \
    gateway_customer_id, status, amount, cycle, billing_type, next_due_date, created_at, \
    updated_at, cancelled_at";

const TRANSACTION_COLUMNS: &str = "id, kind, amount, category, description, payment_id, \
    member_id, occurred_on, recorded_by, created_at";

/// PostgreSQL implementation of the LedgerStore port.
pub struct PostgresLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Opens a transaction whose row locks give up after `lock_timeout`.
    async fn begin_locked(&self) -> Result<Transaction<'static, Postgres>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        // SET does not accept bind parameters; the value is an integer we own.
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("set lock timeout", e))?;

        Ok(tx)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Rows
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    member_id: Uuid,
    gateway_customer_id: String,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for GatewayCustomer {
    fn from(row: CustomerRow) -> Self {
        GatewayCustomer {
            member_id: MemberId::from_uuid(row.member_id),
            gateway_customer_id: row.gateway_customer_id,
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    member_id: Uuid,
    gateway_subscription_id: String,
    gateway_customer_id: String,
    status: String,
    amount: Decimal,
    cycle: String,
    billing_type: String,
    next_due_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            member_id: MemberId::from_uuid(row.member_id),
            gateway_subscription_id: row.gateway_subscription_id,
            gateway_customer_id: row.gateway_customer_id,
            status: parse_column("status", &row.status)?,
            amount: row.amount,
            cycle: parse_column("cycle", &row.cycle)?,
            billing_type: parse_column("billing_type", &row.billing_type)?,
            next_due_date: row.next_due_date,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    member_id: Uuid,
    subscription_id: Option<Uuid>,
    registration_id: Option<Uuid>,
    gateway_payment_id: String,
    amount: Decimal,
    net_amount: Option<Decimal>,
    status: String,
    billing_type: String,
    description: Option<String>,
    due_date: NaiveDate,
    payment_date: Option<DateTime<Utc>>,
    invoice_url: Option<String>,
    bank_slip_url: Option<String>,
    pix_code: Option<String>,
    gateway_installment_id: Option<String>,
    installment_count: Option<i16>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            member_id: MemberId::from_uuid(row.member_id),
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            registration_id: row.registration_id.map(RegistrationId::from_uuid),
            gateway_payment_id: row.gateway_payment_id,
            amount: row.amount,
            net_amount: row.net_amount,
            status: parse_column("status", &row.status)?,
            billing_type: parse_column("billing_type", &row.billing_type)?,
            description: row.description,
            due_date: row.due_date,
            payment_date: row.payment_date.map(Timestamp::from_datetime),
            artifacts: PaymentArtifacts {
                invoice_url: row.invoice_url,
                bank_slip_url: row.bank_slip_url,
                pix_code: row.pix_code,
            },
            installment: installment_plan(row.gateway_installment_id, row.installment_count)?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn installment_plan(
    gateway_installment_id: Option<String>,
    count: Option<i16>,
) -> Result<Option<InstallmentPlan>, DomainError> {
    match (gateway_installment_id, count) {
        (Some(gateway_installment_id), Some(count)) => {
            let count = u8::try_from(count).map_err(|_| {
                DomainError::database(format!("installment_count out of range: {}", count))
            })?;
            Ok(Some(InstallmentPlan {
                gateway_installment_id,
                count,
            }))
        }
        _ => Ok(None),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    kind: String,
    amount: Decimal,
    category: String,
    description: String,
    payment_id: Option<Uuid>,
    member_id: Option<Uuid>,
    occurred_on: NaiveDate,
    recorded_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for FinancialTransaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(FinancialTransaction {
            id: TransactionId::from_uuid(row.id),
            kind: parse_column("kind", &row.kind)?,
            amount: row.amount,
            category: row.category,
            description: row.description,
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            member_id: row.member_id.map(MemberId::from_uuid),
            occurred_on: row.occurred_on,
            recorded_by: row.recorded_by.map(MemberId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    total_income: Decimal,
    total_expense: Decimal,
    transaction_count: i64,
}

fn parse_column<T>(column: &str, value: &str) -> Result<T, DomainError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid {} value '{}': {}", column, value, e),
        )
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Statements shared by several operations
// ════════════════════════════════════════════════════════════════════════════════

async fn insert_transaction(
    conn: &mut PgConnection,
    transaction: &FinancialTransaction,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO financial_transactions (
            id, kind, amount, category, description, payment_id, member_id,
            occurred_on, recorded_by, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (payment_id) WHERE payment_id IS NOT NULL DO NOTHING
        "#,
    )
    .bind(transaction.id.as_uuid())
    .bind(transaction.kind.as_str())
    .bind(transaction.amount)
    .bind(&transaction.category)
    .bind(&transaction.description)
    .bind(transaction.payment_id.map(|id| *id.as_uuid()))
    .bind(transaction.member_id.map(|id| *id.as_uuid()))
    .bind(transaction.occurred_on)
    .bind(transaction.recorded_by.map(|id| *id.as_uuid()))
    .bind(transaction.created_at.as_datetime())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// What a RECEIVED charge means for its event registration.
#[derive(Debug, PartialEq, Eq)]
enum RegistrationSettlement {
    /// No registration row; the charge is booked without settling anything.
    Missing,
    AlreadyPaid,
    /// Installments still outstanding.
    Open,
    Settle,
}

fn registration_settlement(
    payment_status: Option<&str>,
    received: i64,
    expected: usize,
) -> RegistrationSettlement {
    match payment_status {
        None => RegistrationSettlement::Missing,
        Some("PAID") => RegistrationSettlement::AlreadyPaid,
        Some(_) if usize::try_from(received).unwrap_or_default() < expected => {
            RegistrationSettlement::Open
        }
        Some(_) => RegistrationSettlement::Settle,
    }
}

/// Flags the registration as paid once `expected` of its charges are
/// RECEIVED. The registration row lock serialises sibling installments
/// settling concurrently.
async fn settle_registration(
    conn: &mut PgConnection,
    registration_id: RegistrationId,
    expected: usize,
) -> Result<bool, DomainError> {
    let locked: Option<(String,)> = sqlx::query_as(
        "SELECT payment_status FROM event_registrations WHERE id = $1 FOR UPDATE",
    )
    .bind(registration_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error("lock event registration", e))?;

    let (received,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM payments WHERE registration_id = $1 AND status = 'RECEIVED'",
    )
    .bind(registration_id.as_uuid())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| db_error("count received installments", e))?;

    let payment_status = locked.as_ref().map(|(status,)| status.as_str());
    match registration_settlement(payment_status, received, expected) {
        RegistrationSettlement::Missing => {
            tracing::warn!(
                registration_id = %registration_id,
                "Event registration not found; payment recorded without settling it"
            );
            return Ok(false);
        }
        RegistrationSettlement::AlreadyPaid => return Ok(false),
        RegistrationSettlement::Open => {
            tracing::debug!(
                registration_id = %registration_id,
                received,
                expected,
                "Installment received; registration still open"
            );
            return Ok(false);
        }
        RegistrationSettlement::Settle => {}
    }

    let result =
        sqlx::query("UPDATE event_registrations SET payment_status = 'PAID' WHERE id = $1")
            .bind(registration_id.as_uuid())
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("settle event registration", e))?;

    if result.rows_affected() == 0 {
        tracing::warn!(
            registration_id = %registration_id,
            "Event registration vanished before it could be settled"
        );
        return Ok(false);
    }
    Ok(true)
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn find_customer(
        &self,
        member_id: MemberId,
    ) -> Result<Option<GatewayCustomer>, DomainError> {
        let row: Option<CustomerRow> = sqlx::query_as(
            "SELECT member_id, gateway_customer_id, created_at FROM gateway_customers WHERE member_id = $1",
        )
        .bind(member_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find gateway customer", e))?;

        Ok(row.map(GatewayCustomer::from))
    }

    async fn save_customer(
        &self,
        customer: &GatewayCustomer,
    ) -> Result<GatewayCustomer, DomainError> {
        sqlx::query(
            r#"
            INSERT INTO gateway_customers (member_id, gateway_customer_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (member_id) DO NOTHING
            "#,
        )
        .bind(customer.member_id.as_uuid())
        .bind(&customer.gateway_customer_id)
        .bind(customer.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save gateway customer", e))?;

        self.find_customer(customer.member_id)
            .await?
            .ok_or_else(|| DomainError::database("gateway customer vanished after insert"))
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, member_id, gateway_subscription_id, gateway_customer_id, status, amount,
                cycle, billing_type, next_due_date, created_at, updated_at, cancelled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.member_id.as_uuid())
        .bind(&subscription.gateway_subscription_id)
        .bind(&subscription.gateway_customer_id)
        .bind(subscription.status.as_str())
        .bind(subscription.amount)
        .bind(subscription.cycle.as_str())
        .bind(subscription.billing_type.as_str())
        .bind(subscription.next_due_date)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.cancelled_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_one_active_per_member") {
                    return DomainError::new(
                        ErrorCode::AlreadySubscribed,
                        "Member already has an active subscription",
                    );
                }
            }
            db_error("insert subscription", e)
        })?;

        Ok(())
    }

    async fn find_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!("SELECT {} FROM subscriptions WHERE id = $1", SUBSCRIPTION_COLUMNS);
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE gateway_subscription_id = $1",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(gateway_subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_active_subscription(
        &self,
        member_id: MemberId,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE member_id = $1 AND status = 'ACTIVE'",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(member_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find active subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn apply_subscription_transition(
        &self,
        gateway_subscription_id: &str,
        target: SubscriptionStatus,
        at: Timestamp,
    ) -> Result<Option<SubscriptionUpdate>, DomainError> {
        let mut tx = self.begin_locked().await?;

        let sql = format!(
            "SELECT {} FROM subscriptions WHERE gateway_subscription_id = $1 FOR UPDATE",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(gateway_subscription_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("lock subscription", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut subscription = Subscription::try_from(row)?;
        let transition = subscription.apply_transition(target, at);

        if transition.is_applied() {
            sqlx::query(
                "UPDATE subscriptions SET status = $2, updated_at = $3, cancelled_at = $4 WHERE id = $1",
            )
            .bind(subscription.id.as_uuid())
            .bind(subscription.status.as_str())
            .bind(subscription.updated_at.as_datetime())
            .bind(subscription.cancelled_at.map(|t| *t.as_datetime()))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("update subscription", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit subscription transition", e))?;

        Ok(Some(SubscriptionUpdate {
            subscription,
            transition,
        }))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<Payment, DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, member_id, subscription_id, registration_id, gateway_payment_id, amount,
                net_amount, status, billing_type, description, due_date, payment_date,
                invoice_url, bank_slip_url, pix_code, gateway_installment_id, installment_count,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                      $18, $19)
            ON CONFLICT (gateway_payment_id) DO NOTHING
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.member_id.as_uuid())
        .bind(payment.subscription_id.map(|id| *id.as_uuid()))
        .bind(payment.registration_id.map(|id| *id.as_uuid()))
        .bind(&payment.gateway_payment_id)
        .bind(payment.amount)
        .bind(payment.net_amount)
        .bind(payment.status.as_str())
        .bind(payment.billing_type.as_str())
        .bind(&payment.description)
        .bind(payment.due_date)
        .bind(payment.payment_date.map(|t| *t.as_datetime()))
        .bind(&payment.artifacts.invoice_url)
        .bind(&payment.artifacts.bank_slip_url)
        .bind(&payment.artifacts.pix_code)
        .bind(
            payment
                .installment
                .as_ref()
                .map(|plan| plan.gateway_installment_id.as_str()),
        )
        .bind(payment.installment.as_ref().map(|plan| i16::from(plan.count)))
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert payment", e))?;

        self.find_payment_by_gateway_id(&payment.gateway_payment_id)
            .await?
            .ok_or_else(|| DomainError::database("payment vanished after insert"))
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_payment_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE gateway_payment_id = $1",
            PAYMENT_COLUMNS
        );
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(gateway_payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_payments_by_installment(
        &self,
        gateway_installment_id: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE gateway_installment_id = $1 ORDER BY due_date ASC",
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(gateway_installment_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("find installment payments", e))?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn list_payments_for_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<Payment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE member_id = $1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(member_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list payments", e))?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn find_stale_payments(
        &self,
        due_on_or_before: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE status IN ('PENDING', 'CONFIRMED') AND due_date <= $1
            ORDER BY due_date ASC
            LIMIT $2
            "#,
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(due_on_or_before)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("find stale payments", e))?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn apply_payment_transition(
        &self,
        gateway_payment_id: &str,
        target: PaymentStatus,
        source: &TransitionSource,
        at: Timestamp,
    ) -> Result<Option<PaymentUpdate>, DomainError> {
        let mut tx = self.begin_locked().await?;

        let sql = format!(
            "SELECT {} FROM payments WHERE gateway_payment_id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        );
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(gateway_payment_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("lock payment", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut payment = Payment::try_from(row)?;
        let effects = payment.apply_transition(target, source, at);
        let mut registration_settled = false;

        if effects.transition.is_applied() {
            sqlx::query(
                "UPDATE payments SET status = $2, payment_date = $3, updated_at = $4 WHERE id = $1",
            )
            .bind(payment.id.as_uuid())
            .bind(payment.status.as_str())
            .bind(payment.payment_date.map(|t| *t.as_datetime()))
            .bind(payment.updated_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("update payment", e))?;

            if let Some(income) = &effects.income {
                let inserted = insert_transaction(&mut tx, income)
                    .await
                    .map_err(|e| db_error("insert income", e))?;
                if !inserted {
                    tracing::warn!(
                        gateway_payment_id,
                        payment_id = %payment.id,
                        "Income line already present for payment"
                    );
                }
            }

            if let Some(registration_id) = effects.settled_registration {
                registration_settled = settle_registration(
                    &mut tx,
                    registration_id,
                    payment.installments_expected(),
                )
                .await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit payment transition", e))?;

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
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error("acquire connection", e))?;

        let inserted = insert_transaction(&mut conn, transaction)
            .await
            .map_err(|e| db_error("insert financial transaction", e))?;
        if !inserted {
            return Err(DomainError::conflict(
                "payment already has a ledger line",
            ));
        }
        Ok(())
    }

    async fn transactions_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<FinancialTransaction>, DomainError> {
        let sql = format!(
            "SELECT {} FROM financial_transactions WHERE payment_id = $1",
            TRANSACTION_COLUMNS
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(payment_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("find transactions", e))?;

        rows.into_iter().map(FinancialTransaction::try_from).collect()
    }

    async fn financial_summary(
        &self,
        period: SummaryPeriod,
    ) -> Result<FinancialSummary, DomainError> {
        let row: SummaryRow = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE kind = 'INCOME'), 0) AS total_income,
                COALESCE(SUM(amount) FILTER (WHERE kind = 'EXPENSE'), 0) AS total_expense,
                COUNT(*) AS transaction_count
            FROM financial_transactions
            WHERE ($1::date IS NULL OR occurred_on >= $1)
              AND ($2::date IS NULL OR occurred_on <= $2)
            "#,
        )
        .bind(period.from)
        .bind(period.to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("financial summary", e))?;

        Ok(FinancialSummary::from_totals(
            row.total_income,
            row.total_expense,
            u64::try_from(row.transaction_count).unwrap_or_default(),
            period,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_registration_is_not_settled() {
        assert_eq!(
            registration_settlement(None, 1, 1),
            RegistrationSettlement::Missing
        );
    }

    #[test]
    fn split_registration_waits_for_every_installment() {
        assert_eq!(
            registration_settlement(Some("PENDING"), 2, 3),
            RegistrationSettlement::Open
        );
        assert_eq!(
            registration_settlement(Some("PENDING"), 3, 3),
            RegistrationSettlement::Settle
        );
        assert_eq!(
            registration_settlement(Some("PAID"), 3, 3),
            RegistrationSettlement::AlreadyPaid
        );
    }

    #[test]
    fn installment_columns_must_come_in_pairs() {
        let plan = installment_plan(Some("ins_1".to_string()), Some(3)).unwrap();
        assert_eq!(
            plan,
            Some(InstallmentPlan {
                gateway_installment_id: "ins_1".to_string(),
                count: 3,
            })
        );
        assert_eq!(installment_plan(Some("ins_1".to_string()), None).unwrap(), None);
        assert!(installment_plan(Some("ins_1".to_string()), Some(-1)).is_err());
    }
}
