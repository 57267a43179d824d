//! ListMemberPaymentsHandler - Query handler for a member's payment history.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Payment, RequestContext};
use crate::domain::foundation::MemberId;
use crate::ports::LedgerStore;

#[derive(Debug, Clone)]
pub struct ListMemberPaymentsQuery {
    pub ctx: RequestContext,
    pub member_id: MemberId,
}

/// Newest first.
pub type ListMemberPaymentsResult = Vec<Payment>;

pub struct ListMemberPaymentsHandler {
    ledger: Arc<dyn LedgerStore>,
}

impl ListMemberPaymentsHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn handle(
        &self,
        query: ListMemberPaymentsQuery,
    ) -> Result<ListMemberPaymentsResult, BillingError> {
        query.ctx.require_self_or_admin(query.member_id)?;
        Ok(self.ledger.list_payments_for_member(query.member_id).await?)
    }
}
