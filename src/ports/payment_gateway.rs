//! Payment gateway port.
//!
//! Thin contract over the external gateway: customers, subscriptions,
//! one-off charges and PIX QR codes. No retries live behind this port;
//! callers decide what a failure means for them.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingCycle, BillingError, BillingType, PaymentArtifacts, PaymentStatus};
use crate::domain::foundation::MemberId;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers a member as a gateway customer.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CreatedCustomer, GatewayError>;

    /// Creates a recurring charge for an existing customer.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// Stops a recurring charge. Pending installments are removed by the gateway.
    async fn cancel_subscription(&self, gateway_subscription_id: &str) -> Result<(), GatewayError>;

    /// Creates a one-off charge. With more than one installment the gateway
    /// answers with the first installment; the rest share its
    /// `installment_id`.
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError>;

    /// Reads the authoritative state of a charge. `None` if the gateway
    /// does not know the id.
    async fn get_payment(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<GatewayPayment>, GatewayError>;

    /// Every charge of a split payment, in due-date order.
    async fn list_installment_payments(
        &self,
        gateway_installment_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError>;

    /// Fetches the PIX copy-and-paste payload and QR image for a charge.
    async fn get_pix_qr_code(&self, gateway_payment_id: &str) -> Result<PixQrCode, GatewayError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Sent as the gateway's external reference.
    pub member_id: MemberId,
    pub name: String,
    pub email: String,
    pub tax_id: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedCustomer {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub billing_type: BillingType,
    pub value: Decimal,
    pub cycle: BillingCycle,
    pub next_due_date: NaiveDate,
    pub description: String,
    pub external_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySubscription {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub next_due_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub customer_id: String,
    pub billing_type: BillingType,
    pub value: Decimal,
    pub due_date: NaiveDate,
    pub description: String,
    pub external_reference: Option<String>,
    /// Split the charge into this many monthly installments.
    pub installment_count: Option<u8>,
}

/// A charge as the gateway sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Shared by all charges of one split payment.
    pub installment_id: Option<String>,
    /// Raw gateway status, e.g. `RECEIVED_IN_CASH`.
    pub status: String,
    pub value: Decimal,
    pub net_value: Option<Decimal>,
    pub billing_type: BillingType,
    pub due_date: NaiveDate,
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    pub deleted: bool,
}

impl GatewayPayment {
    /// Local status this charge corresponds to, if any.
    pub fn local_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_gateway(&self.status, self.deleted)
    }

    pub fn artifacts(&self) -> PaymentArtifacts {
        PaymentArtifacts {
            invoice_url: self.invoice_url.clone(),
            bank_slip_url: self.bank_slip_url.clone(),
            pix_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixQrCode {
    /// Base64 PNG of the QR code.
    pub encoded_image: String,
    /// Copy-and-paste payload.
    pub payload: String,
    pub expiration_date: Option<String>,
}

/// Gateway failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    /// Internal detail for logs. Never shown to members.
    pub message: String,
    /// HTTP status of a non-2xx answer.
    pub http_status: Option<u16>,
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorCode {
    /// Bounded request timeout elapsed.
    Timeout,
    /// Connection could not be established or was dropped.
    Network,
    /// Gateway answered with a non-2xx status.
    NonSuccess,
    /// 2xx answer whose body could not be decoded.
    InvalidResponse,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Network, message)
    }

    pub fn non_success(status: u16, body: impl Into<String>) -> Self {
        Self {
            http_status: Some(status),
            retryable: status >= 500 || status == 429,
            ..Self::new(GatewayErrorCode::NonSuccess, body)
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidResponse, message)
    }

    /// Classifies a reqwest failure.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_decode() {
            Self::invalid_response(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

impl GatewayErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayErrorCode::Timeout | GatewayErrorCode::Network)
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::Network => "network_error",
            GatewayErrorCode::NonSuccess => "non_success",
            GatewayErrorCode::InvalidResponse => "invalid_response",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "{} ({}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        BillingError::GatewayUnavailable(err.to_string())
    }
}
