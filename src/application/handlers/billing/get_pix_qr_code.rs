//! GetPixQrCodeHandler - Query handler for a payment's PIX QR code.

use std::sync::Arc;

use crate::domain::billing::{BillingError, RequestContext};
use crate::domain::foundation::PaymentId;
use crate::ports::{LedgerStore, PaymentGateway, PixQrCode};

#[derive(Debug, Clone)]
pub struct GetPixQrCodeQuery {
    pub ctx: RequestContext,
    pub payment_id: PaymentId,
}

pub type GetPixQrCodeResult = PixQrCode;

pub struct GetPixQrCodeHandler {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl GetPixQrCodeHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { ledger, gateway }
    }

    pub async fn handle(&self, query: GetPixQrCodeQuery) -> Result<GetPixQrCodeResult, BillingError> {
        let payment = self
            .ledger
            .find_payment(query.payment_id)
            .await?
            .ok_or(BillingError::PaymentNotFound(query.payment_id))?;

        query.ctx.require_self_or_admin(payment.member_id)?;

        if !payment.billing_type.capabilities().pix_qr_code {
            return Err(BillingError::validation(
                "billing_type",
                format!("{} charges have no PIX code", payment.billing_type),
            ));
        }

        self.gateway
            .get_pix_qr_code(&payment.gateway_payment_id)
            .await
            .map_err(|e| {
                tracing::warn!(
                    operation = "get_pix_qr_code",
                    member_id = %payment.member_id,
                    gateway_payment_id = %payment.gateway_payment_id,
                    error = %e,
                    "PIX code lookup failed"
                );
                BillingError::from(e)
            })
    }
}
