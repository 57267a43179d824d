//! PostgreSQL implementation of WebhookEventRepository.
//!
//! The primary key on `gateway_event_id` is the deduplication mechanism:
//! concurrent deliveries race on `INSERT … ON CONFLICT DO NOTHING` and
//! exactly one of them inserts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{RecordOutcome, WebhookEventRecord, WebhookEventRepository};

use super::db_error;

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    gateway_event_id: String,
    event_type: String,
    gateway_payment_id: Option<String>,
    gateway_subscription_id: Option<String>,
    gateway_customer_id: Option<String>,
    payload: String,
    processed: bool,
    processed_at: Option<DateTime<Utc>>,
    outcome: Option<String>,
    received_at: DateTime<Utc>,
}

impl From<WebhookEventRow> for WebhookEventRecord {
    fn from(row: WebhookEventRow) -> Self {
        WebhookEventRecord {
            event_id: row.gateway_event_id,
            event_type: row.event_type,
            gateway_payment_id: row.gateway_payment_id,
            gateway_subscription_id: row.gateway_subscription_id,
            gateway_customer_id: row.gateway_customer_id,
            payload: row.payload,
            processed: row.processed,
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            outcome: row.outcome,
            received_at: Timestamp::from_datetime(row.received_at),
        }
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn try_record(&self, record: WebhookEventRecord) -> Result<RecordOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                gateway_event_id, event_type, gateway_payment_id, gateway_subscription_id,
                gateway_customer_id, payload, processed, received_at
            ) VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            ON CONFLICT (gateway_event_id) DO NOTHING
            "#,
        )
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(&record.gateway_payment_id)
        .bind(&record.gateway_subscription_id)
        .bind(&record.gateway_customer_id)
        .bind(&record.payload)
        .bind(record.received_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("record webhook event", e))?;

        if result.rows_affected() == 1 {
            return Ok(RecordOutcome::NewlyRecorded);
        }

        let existing = self
            .find_by_event_id(&record.event_id)
            .await?
            .ok_or_else(|| DomainError::database("webhook event vanished after conflict"))?;

        if existing.processed {
            Ok(RecordOutcome::AlreadyProcessed)
        } else {
            Ok(RecordOutcome::PendingRetry(existing))
        }
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        outcome: &str,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = TRUE, processed_at = $2, outcome = $3
            WHERE gateway_event_id = $1 AND NOT processed
            "#,
        )
        .bind(event_id)
        .bind(at.as_datetime())
        .bind(outcome)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("mark webhook event processed", e))?;

        if result.rows_affected() == 0 && self.find_by_event_id(event_id).await?.is_none() {
            return Err(DomainError::database(format!(
                "webhook event {} not recorded",
                event_id
            )));
        }
        Ok(())
    }

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT gateway_event_id, event_type, gateway_payment_id, gateway_subscription_id,
                   gateway_customer_id, payload, processed, processed_at, outcome, received_at
            FROM webhook_events
            WHERE gateway_event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find webhook event", e))?;

        Ok(row.map(WebhookEventRecord::from))
    }
}
