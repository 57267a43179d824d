//! RecordFinancialTransactionHandler - Command handler for manual ledger lines.

use std::sync::Arc;

use crate::domain::billing::{BillingError, FinancialTransaction, ManualEntry, RequestContext};
use crate::domain::foundation::Timestamp;
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct RecordFinancialTransactionCommand {
    pub ctx: RequestContext,
    pub entry: ManualEntry,
}

pub type RecordFinancialTransactionResult = FinancialTransaction;

/// Books income or expense not tied to a gateway charge. Admin only.
pub struct RecordFinancialTransactionHandler {
    ledger: Arc<dyn LedgerStore>,
}

impl RecordFinancialTransactionHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn handle(
        &self,
        cmd: RecordFinancialTransactionCommand,
    ) -> Result<RecordFinancialTransactionResult, BillingError> {
        cmd.ctx.require_admin()?;

        let line = FinancialTransaction::manual(cmd.entry, cmd.ctx.member_id, Timestamp::now())?;
        self.ledger.record_transaction(&line).await?;

        tracing::info!(
            transaction_id = %line.id,
            kind = %line.kind,
            amount = %line.amount,
            category = %line.category,
            recorded_by = %cmd.ctx.member_id,
            "Manual ledger line recorded"
        );

        Ok(line)
    }
}
