//! Wire types for the gateway REST API.
//!
//! Field names follow the gateway's camelCase JSON. Only the subset the
//! engine consumes is decoded; unknown fields are ignored.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingCycle, BillingType};
use crate::ports::{
    CreateCustomerRequest, CreatePaymentRequest, CreateSubscriptionRequest, CreatedCustomer,
    GatewayPayment, GatewaySubscription, PixQrCode,
};

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBody {
    pub name: String,
    pub email: String,
    pub cpf_cnpj: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    pub external_reference: String,
}

impl From<CreateCustomerRequest> for CustomerBody {
    fn from(request: CreateCustomerRequest) -> Self {
        Self {
            name: request.name,
            email: request.email,
            cpf_cnpj: request.tax_id,
            mobile_phone: request.phone,
            external_reference: request.member_id.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionBody {
    pub customer: String,
    pub billing_type: BillingType,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub next_due_date: NaiveDate,
    pub cycle: BillingCycle,
    pub description: String,
    pub external_reference: String,
}

impl From<CreateSubscriptionRequest> for SubscriptionBody {
    fn from(request: CreateSubscriptionRequest) -> Self {
        Self {
            customer: request.customer_id,
            billing_type: request.billing_type,
            value: request.value,
            next_due_date: request.next_due_date,
            cycle: request.cycle,
            description: request.description,
            external_reference: request.external_reference,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    pub customer: String,
    pub billing_type: BillingType,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub due_date: NaiveDate,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_count: Option<u8>,
    /// Total split across installments; sent instead of `value` semantics
    /// when installments are requested.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub total_value: Option<Decimal>,
}

impl From<CreatePaymentRequest> for PaymentBody {
    fn from(request: CreatePaymentRequest) -> Self {
        let installments = request.installment_count.filter(|count| *count > 1);
        Self {
            customer: request.customer_id,
            billing_type: request.billing_type,
            value: request.value,
            due_date: request.due_date,
            description: request.description,
            external_reference: request.external_reference,
            installment_count: installments,
            total_value: installments.map(|_| request.value),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CustomerResource {
    pub id: String,
}

impl From<CustomerResource> for CreatedCustomer {
    fn from(resource: CustomerResource) -> Self {
        CreatedCustomer { id: resource.id }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResource {
    pub id: String,
    pub customer: String,
    #[serde(default)]
    pub status: Option<String>,
    pub next_due_date: NaiveDate,
}

impl From<SubscriptionResource> for GatewaySubscription {
    fn from(resource: SubscriptionResource) -> Self {
        GatewaySubscription {
            id: resource.id,
            customer_id: resource.customer,
            status: resource.status.unwrap_or_else(|| "ACTIVE".to_string()),
            next_due_date: resource.next_due_date,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResource {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub installment: Option<String>,
    pub status: String,
    pub value: Decimal,
    #[serde(default)]
    pub net_value: Option<Decimal>,
    pub billing_type: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub invoice_url: Option<String>,
    #[serde(default)]
    pub bank_slip_url: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl From<PaymentResource> for GatewayPayment {
    fn from(resource: PaymentResource) -> Self {
        GatewayPayment {
            id: resource.id,
            customer_id: resource.customer,
            subscription_id: resource.subscription,
            installment_id: resource.installment,
            status: resource.status,
            value: resource.value,
            net_value: resource.net_value,
            billing_type: resource
                .billing_type
                .parse()
                .unwrap_or(BillingType::Undefined),
            due_date: resource.due_date,
            invoice_url: resource.invoice_url,
            bank_slip_url: resource.bank_slip_url,
            deleted: resource.deleted,
        }
    }
}

/// Page of a list endpoint: `{"data":[...],"hasMore":false}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResource<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixQrCodeResource {
    pub encoded_image: String,
    pub payload: String,
    #[serde(default)]
    pub expiration_date: Option<String>,
}

impl From<PixQrCodeResource> for PixQrCode {
    fn from(resource: PixQrCodeResource) -> Self {
        PixQrCode {
            encoded_image: resource.encoded_image,
            payload: resource.payload,
            expiration_date: resource.expiration_date,
        }
    }
}

/// Error envelope: `{"errors":[{"code":"...","description":"..."}]}`.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ErrorEnvelope {
    /// First error description, if the body was an error envelope.
    pub fn summary(body: &str) -> Option<String> {
        let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
        let first = envelope.errors.into_iter().next()?;
        match (first.code, first.description) {
            (Some(code), Some(description)) => Some(format!("{}: {}", code, description)),
            (None, Some(description)) => Some(description),
            (Some(code), None) => Some(code),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::MemberId;

    #[test]
    fn payment_resource_decodes_gateway_json() {
        let json = r#"{
            "object": "payment",
            "id": "pay_080225913252",
            "customer": "cus_G7Dvo4iphUNk",
            "subscription": "sub_VXJBYgP2u0eO",
            "value": 10.0,
            "netValue": 9.01,
            "billingType": "BOLETO",
            "status": "RECEIVED",
            "dueDate": "2024-02-14",
            "invoiceUrl": "https://gateway.test/i/080225913252",
            "bankSlipUrl": "https://gateway.test/b/pdf/080225913252",
            "deleted": false
        }"#;

        let resource: PaymentResource = serde_json::from_str(json).unwrap();
        let payment: GatewayPayment = resource.into();

        assert_eq!(payment.id, "pay_080225913252");
        assert_eq!(payment.subscription_id.as_deref(), Some("sub_VXJBYgP2u0eO"));
        assert_eq!(payment.value, Decimal::new(10, 0));
        assert_eq!(payment.net_value, Some(Decimal::new(901, 2)));
        assert_eq!(payment.billing_type, BillingType::Boleto);
        assert!(!payment.deleted);
    }

    #[test]
    fn unknown_billing_type_falls_back_to_undefined() {
        let json = r#"{"id":"pay_1","status":"PENDING","value":5,"billingType":"TRANSFER","dueDate":"2024-02-14"}"#;
        let payment: GatewayPayment = serde_json::from_str::<PaymentResource>(json).unwrap().into();
        assert_eq!(payment.billing_type, BillingType::Undefined);
    }

    #[test]
    fn installment_listing_keeps_the_shared_installment_id() {
        let json = r#"{
            "object": "list",
            "hasMore": false,
            "data": [
                {"id":"pay_1","installment":"ins_9","status":"PENDING","value":100.0,"billingType":"CREDIT_CARD","dueDate":"2024-05-20"},
                {"id":"pay_2","installment":"ins_9","status":"PENDING","value":100.0,"billingType":"CREDIT_CARD","dueDate":"2024-06-20"}
            ]
        }"#;

        let page: ListResource<PaymentResource> = serde_json::from_str(json).unwrap();
        let payments: Vec<GatewayPayment> = page.data.into_iter().map(Into::into).collect();

        assert!(!page.has_more);
        assert_eq!(payments.len(), 2);
        assert!(payments
            .iter()
            .all(|p| p.installment_id.as_deref() == Some("ins_9")));
    }

    #[test]
    fn customer_body_sends_member_as_external_reference() {
        let member_id = MemberId::new();
        let body = CustomerBody::from(CreateCustomerRequest {
            member_id,
            name: "Carlos Souza".to_string(),
            email: "carlos@example.com".to_string(),
            tax_id: "12345678909".to_string(),
            phone: None,
        });

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["cpfCnpj"], "12345678909");
        assert_eq!(json["externalReference"], member_id.to_string());
        assert!(json.get("mobilePhone").is_none());
    }

    #[test]
    fn subscription_body_sends_value_as_number() {
        let body = SubscriptionBody::from(CreateSubscriptionRequest {
            customer_id: "cus_1".to_string(),
            billing_type: BillingType::Undefined,
            value: Decimal::new(1000, 2),
            cycle: BillingCycle::Monthly,
            next_due_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            description: "Mensalidade".to_string(),
            external_reference: "member".to_string(),
        });

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["value"], serde_json::json!(10.0));
        assert_eq!(json["cycle"], "MONTHLY");
        assert_eq!(json["nextDueDate"], "2024-03-15");
    }

    #[test]
    fn payment_body_includes_installments_only_when_split() {
        let request = CreatePaymentRequest {
            customer_id: "cus_1".to_string(),
            billing_type: BillingType::CreditCard,
            value: Decimal::new(30000, 2),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            description: "Jantar de gala".to_string(),
            external_reference: None,
            installment_count: Some(3),
        };
        let json = serde_json::to_value(PaymentBody::from(request.clone())).unwrap();
        assert_eq!(json["installmentCount"], 3);
        assert_eq!(json["totalValue"], serde_json::json!(300.0));

        let single = CreatePaymentRequest {
            installment_count: Some(1),
            ..request
        };
        let json = serde_json::to_value(PaymentBody::from(single)).unwrap();
        assert!(json.get("installmentCount").is_none());
        assert!(json.get("totalValue").is_none());
    }

    #[test]
    fn error_envelope_summary_reads_first_error() {
        let body = r#"{"errors":[{"code":"invalid_cpfCnpj","description":"CPF inválido"}]}"#;
        assert_eq!(
            ErrorEnvelope::summary(body).as_deref(),
            Some("invalid_cpfCnpj: CPF inválido")
        );
        assert!(ErrorEnvelope::summary("<html>").is_none());
    }
}
