//! Lookup-or-create of a member's customer record at the gateway.

use crate::domain::billing::{BillingError, GatewayCustomer, MemberProfile};
use crate::domain::foundation::Timestamp;
use crate::ports::{CreateCustomerRequest, LedgerStore, PaymentGateway};

/// Returns the member's gateway customer, creating it at the gateway on
/// first use.
///
/// When two callers race, both may create a customer at the gateway; the
/// first row stored wins and the loser's gateway customer is left unused.
///
/// A transient gateway failure stays retryable. Only a definitive refusal
/// becomes `GatewayCustomerFailed`.
pub(super) async fn ensure_gateway_customer(
    ledger: &dyn LedgerStore,
    gateway: &dyn PaymentGateway,
    member: &MemberProfile,
) -> Result<GatewayCustomer, BillingError> {
    if let Some(existing) = ledger.find_customer(member.id).await? {
        return Ok(existing);
    }

    let created = gateway
        .create_customer(CreateCustomerRequest {
            member_id: member.id,
            name: member.name.clone(),
            email: member.email.clone(),
            tax_id: member.tax_id.clone(),
            phone: member.phone.clone(),
        })
        .await
        .map_err(|e| {
            tracing::warn!(
                operation = "create_customer",
                member_id = %member.id,
                error = %e,
                retryable = e.retryable,
                "Gateway customer creation failed"
            );
            if e.retryable {
                BillingError::from(e)
            } else {
                BillingError::gateway_customer_failed(e.message)
            }
        })?;

    let customer = GatewayCustomer {
        member_id: member.id,
        gateway_customer_id: created.id,
        created_at: Timestamp::now(),
    };

    let stored = ledger.save_customer(&customer).await?;
    if stored.gateway_customer_id != customer.gateway_customer_id {
        tracing::warn!(
            member_id = %member.id,
            kept = %stored.gateway_customer_id,
            discarded = %customer.gateway_customer_id,
            "Concurrent customer creation, keeping the first stored record"
        );
    } else {
        tracing::info!(
            member_id = %member.id,
            gateway_customer_id = %stored.gateway_customer_id,
            "Gateway customer created"
        );
    }
    Ok(stored)
}
