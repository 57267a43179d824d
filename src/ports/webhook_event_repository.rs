//! WebhookEventRepository port - audit trail and deduplication of gateway
//! webhooks.
//!
//! Every authenticated delivery is recorded before any ledger mutation.
//! The unique event id is the deduplication key; the `processed` flag is
//! the only field that changes after insert.
//!
//! The gateway delivers at least once and may deliver the same event
//! concurrently, so callers must treat [`RecordOutcome::PendingRetry`] as
//! "apply again": the ledger transition itself is idempotent.

use async_trait::async_trait;

use crate::domain::billing::GatewayEvent;
use crate::domain::foundation::{DomainError, Timestamp};

/// Stored webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEventRecord {
    /// Gateway event id.
    pub event_id: String,

    /// Event name as sent, e.g. `payment-received`.
    pub event_type: String,

    pub gateway_payment_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub gateway_customer_id: Option<String>,

    /// Request body, verbatim.
    pub payload: String,

    pub processed: bool,
    pub processed_at: Option<Timestamp>,

    /// How processing concluded: `applied`, `unchanged`, `rejected`,
    /// `unknown_reference` or `ignored`.
    pub outcome: Option<String>,

    pub received_at: Timestamp,
}

impl WebhookEventRecord {
    /// Creates an unprocessed record for a freshly received event.
    pub fn received(event: &GatewayEvent, payload: &[u8], at: Timestamp) -> Self {
        Self {
            event_id: event.id.clone(),
            event_type: event.event.clone(),
            gateway_payment_id: event.payment_id().map(str::to_string),
            gateway_subscription_id: event.subscription_id().map(str::to_string),
            gateway_customer_id: event.customer_id(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            processed: false,
            processed_at: None,
            outcome: None,
            received_at: at,
        }
    }
}

/// Result of recording a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First time this event id is seen.
    NewlyRecorded,

    /// Event was already applied. Nothing to do.
    AlreadyProcessed,

    /// Event was recorded earlier but never marked processed. Carries the
    /// stored record so processing resumes from the original payload.
    PendingRetry(WebhookEventRecord),
}

/// Port for storing and retrieving webhook deliveries.
///
/// Implementations must rely on a unique constraint on the event id so
/// concurrent deliveries of the same event never produce two rows.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Inserts the record unless the event id is already present.
    async fn try_record(&self, record: WebhookEventRecord) -> Result<RecordOutcome, DomainError>;

    /// Flags the event as applied. Idempotent.
    async fn mark_processed(
        &self,
        event_id: &str,
        outcome: &str,
        at: Timestamp,
    ) -> Result<(), DomainError>;

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;
}
