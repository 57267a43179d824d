//! GetFinancialSummaryHandler - Query handler for ledger totals (admin).

use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::billing::{BillingError, FinancialSummary, RequestContext, SummaryPeriod};
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct GetFinancialSummaryQuery {
    pub ctx: RequestContext,
    /// Inclusive lower bound on the transaction date.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the transaction date.
    pub to: Option<NaiveDate>,
}

pub type GetFinancialSummaryResult = FinancialSummary;

pub struct GetFinancialSummaryHandler {
    ledger: Arc<dyn LedgerStore>,
}

impl GetFinancialSummaryHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn handle(
        &self,
        query: GetFinancialSummaryQuery,
    ) -> Result<GetFinancialSummaryResult, BillingError> {
        query.ctx.require_admin()?;
        let period = SummaryPeriod::new(query.from, query.to)?;
        Ok(self.ledger.financial_summary(period).await?)
    }
}
