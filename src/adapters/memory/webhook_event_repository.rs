//! In-memory webhook event repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{RecordOutcome, WebhookEventRecord, WebhookEventRepository};

#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    records: RwLock<HashMap<String, WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn try_record(&self, record: WebhookEventRecord) -> Result<RecordOutcome, DomainError> {
        let mut records = self.records.write().await;
        match records.get(&record.event_id) {
            Some(existing) if existing.processed => Ok(RecordOutcome::AlreadyProcessed),
            Some(existing) => Ok(RecordOutcome::PendingRetry(existing.clone())),
            None => {
                records.insert(record.event_id.clone(), record);
                Ok(RecordOutcome::NewlyRecorded)
            }
        }
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        outcome: &str,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(event_id)
            .ok_or_else(|| DomainError::database(format!("webhook event {} not recorded", event_id)))?;
        if !record.processed {
            record.processed = true;
            record.processed_at = Some(at);
            record.outcome = Some(outcome.to_string());
        }
        Ok(())
    }

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.records.read().await.get(event_id).cloned())
    }
}
