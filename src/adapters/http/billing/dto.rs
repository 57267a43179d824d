//! Data Transfer Objects for billing HTTP endpoints.
//!
//! These types define the JSON request/response format for the billing API.
//! They are separate from domain types to allow independent evolution.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::handlers::billing::HandleGatewayWebhookResult;
use crate::domain::billing::{
    BillingCycle, BillingType, FinancialSummary, FinancialTransaction, Payment, PaymentStatus,
    Subscription, SubscriptionStatus, TransactionKind,
};
use crate::domain::foundation::Timestamp;
use crate::ports::PixQrCode;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to subscribe a member to monthly dues.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeRequest {
    /// Member to subscribe. Defaults to the caller.
    #[serde(default)]
    pub member_id: Option<Uuid>,
    /// Billing type for the installments. Defaults to the configured one.
    #[serde(default)]
    pub billing_type: Option<BillingType>,
}

/// Request to charge an event registration fee.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventPaymentRequest {
    /// Member being charged. Defaults to the caller.
    #[serde(default)]
    pub member_id: Option<Uuid>,
    pub registration_id: Uuid,
    pub amount: Decimal,
    pub billing_type: BillingType,
    pub due_date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub installment_count: Option<u8>,
}

/// Request to book a manual ledger line.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordTransactionRequest {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub occurred_on: NaiveDate,
    #[serde(default)]
    pub member_id: Option<Uuid>,
}

/// Query string of the financial summary endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryParams {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Subscription as exposed over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub member_id: String,
    pub gateway_subscription_id: String,
    pub status: SubscriptionStatus,
    pub amount: Decimal,
    pub cycle: BillingCycle,
    pub billing_type: BillingType,
    pub next_due_date: NaiveDate,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<Timestamp>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id.to_string(),
            member_id: sub.member_id.to_string(),
            gateway_subscription_id: sub.gateway_subscription_id,
            status: sub.status,
            amount: sub.amount,
            cycle: sub.cycle,
            billing_type: sub.billing_type,
            next_due_date: sub.next_due_date,
            created_at: sub.created_at,
            cancelled_at: sub.cancelled_at,
        }
    }
}

/// Payment as exposed over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub member_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
    pub gateway_payment_id: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<Decimal>,
    pub status: PaymentStatus,
    pub billing_type: BillingType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_slip_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_code: Option<String>,
    /// Installments in the split this charge belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_count: Option<u8>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            member_id: payment.member_id.to_string(),
            subscription_id: payment.subscription_id.map(|id| id.to_string()),
            registration_id: payment.registration_id.map(|id| id.to_string()),
            gateway_payment_id: payment.gateway_payment_id,
            amount: payment.amount,
            net_amount: payment.net_amount,
            status: payment.status,
            billing_type: payment.billing_type,
            description: payment.description,
            due_date: payment.due_date,
            payment_date: payment.payment_date,
            invoice_url: payment.artifacts.invoice_url,
            bank_slip_url: payment.artifacts.bank_slip_url,
            pix_code: payment.artifacts.pix_code,
            installment_count: payment.installment.map(|plan| plan.count),
        }
    }
}

/// A member's payment history.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentResponse>,
    pub total: usize,
}

impl From<Vec<Payment>> for PaymentListResponse {
    fn from(payments: Vec<Payment>) -> Self {
        let payments: Vec<PaymentResponse> =
            payments.into_iter().map(PaymentResponse::from).collect();
        Self {
            total: payments.len(),
            payments,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PixQrCodeResponse {
    pub encoded_image: String,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
}

impl From<PixQrCode> for PixQrCodeResponse {
    fn from(qr: PixQrCode) -> Self {
        Self {
            encoded_image: qr.encoded_image,
            payload: qr.payload,
            expiration_date: qr.expiration_date,
        }
    }
}

/// Ledger line as exposed over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    pub occurred_on: NaiveDate,
    pub created_at: Timestamp,
}

impl From<FinancialTransaction> for TransactionResponse {
    fn from(tx: FinancialTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            kind: tx.kind,
            amount: tx.amount,
            category: tx.category,
            description: tx.description,
            payment_id: tx.payment_id.map(|id| id.to_string()),
            member_id: tx.member_id.map(|id| id.to_string()),
            occurred_on: tx.occurred_on,
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FinancialSummaryResponse {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub balance: Decimal,
    pub transaction_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl From<FinancialSummary> for FinancialSummaryResponse {
    fn from(summary: FinancialSummary) -> Self {
        Self {
            total_income: summary.total_income,
            total_expense: summary.total_expense,
            balance: summary.balance,
            transaction_count: summary.transaction_count,
            from: summary.period.from,
            to: summary.period.to,
        }
    }
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub event_id: String,
    pub outcome: String,
}

impl From<HandleGatewayWebhookResult> for WebhookAckResponse {
    fn from(result: HandleGatewayWebhookResult) -> Self {
        Self {
            event_id: result.event_id,
            outcome: result.outcome.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error body. Never carries gateway response bodies or credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{NewPayment, PaymentArtifacts};
    use crate::domain::foundation::MemberId;
    use serde_json::json;

    #[test]
    fn subscribe_request_accepts_empty_body() {
        let req: SubscribeRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.member_id.is_none());
        assert!(req.billing_type.is_none());
    }

    #[test]
    fn subscribe_request_parses_billing_type() {
        let req: SubscribeRequest =
            serde_json::from_value(json!({ "billing_type": "PIX" })).unwrap();
        assert_eq!(req.billing_type, Some(BillingType::Pix));
    }

    #[test]
    fn event_payment_request_parses_decimal_amount() {
        let req: CreateEventPaymentRequest = serde_json::from_value(json!({
            "registration_id": Uuid::new_v4(),
            "amount": "45.90",
            "billing_type": "CREDIT_CARD",
            "due_date": "2026-11-20",
            "description": "Encontro anual",
            "installment_count": 3
        }))
        .unwrap();
        assert_eq!(req.amount, Decimal::new(4590, 2));
        assert_eq!(req.installment_count, Some(3));
    }

    #[test]
    fn transaction_request_rejects_unknown_kind() {
        let result: Result<RecordTransactionRequest, _> = serde_json::from_value(json!({
            "kind": "TRANSFER",
            "amount": "10.00",
            "category": "misc",
            "description": "x",
            "occurred_on": "2026-01-01"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn payment_response_flattens_artifacts_and_skips_empty_fields() {
        let payment = Payment::new(
            NewPayment {
                member_id: MemberId::new(),
                subscription_id: None,
                registration_id: None,
                gateway_payment_id: "pay_1".to_string(),
                amount: Decimal::new(1000, 2),
                net_amount: None,
                billing_type: BillingType::Boleto,
                description: None,
                due_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
                artifacts: PaymentArtifacts {
                    invoice_url: Some("https://pay/i/1".to_string()),
                    bank_slip_url: None,
                    pix_code: None,
                },
            },
            Timestamp::now(),
        )
        .unwrap();

        let value = serde_json::to_value(PaymentResponse::from(payment)).unwrap();
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["billing_type"], "BOLETO");
        assert_eq!(value["invoice_url"], "https://pay/i/1");
        assert!(value.get("bank_slip_url").is_none());
        assert!(value.get("payment_date").is_none());
    }

    #[test]
    fn error_response_serializes_code_and_message() {
        let value = serde_json::to_value(ErrorResponse::new("FORBIDDEN", "Not allowed")).unwrap();
        assert_eq!(value, json!({ "code": "FORBIDDEN", "message": "Not allowed" }));
    }
}
