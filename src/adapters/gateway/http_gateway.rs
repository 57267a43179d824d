//! REST client for the payment gateway.
//!
//! Implements the `PaymentGateway` port over reqwest. Every request carries
//! the API key in the `access_token` header and is bounded by the client
//! timeout; timeouts, connection failures and non-2xx answers all surface
//! as [`GatewayError`] and are logged with the operation name.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::ports::{
    CreateCustomerRequest, CreatePaymentRequest, CreateSubscriptionRequest, CreatedCustomer,
    GatewayError, GatewayPayment, GatewaySubscription, PaymentGateway, PixQrCode,
};

use super::gateway_types::{
    CustomerBody, CustomerResource, ErrorEnvelope, ListResource, PaymentBody, PaymentResource,
    PixQrCodeResource, SubscriptionBody, SubscriptionResource,
};

const ACCESS_TOKEN_HEADER: &str = "access_token";

/// Gateway REST adapter.
pub struct HttpPaymentGateway {
    base_url: String,
    api_key: SecretString,
    http_client: reqwest::Client,
}

impl HttpPaymentGateway {
    /// Builds a client with the configured per-request timeout.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_timeout(&config.base_url, config.api_key.clone(), config.timeout())
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quartel-billing/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(ACCESS_TOKEN_HEADER, self.api_key.expose_secret())
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, GatewayError> {
        self.authorized(builder).send().await.map_err(|e| {
            let err = GatewayError::from_reqwest(&e);
            tracing::error!(operation, error = %err, "Gateway request failed");
            err
        })
    }

    /// Decodes a 2xx body, or turns anything else into a `GatewayError`.
    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::non_success(operation, status, response).await);
        }

        response.json::<T>().await.map_err(|e| {
            tracing::error!(operation, error = %e, "Failed to parse gateway response");
            GatewayError::invalid_response(e.to_string())
        })
    }

    async fn non_success(
        operation: &'static str,
        status: StatusCode,
        response: Response,
    ) -> GatewayError {
        let body = response.text().await.unwrap_or_default();
        let detail = ErrorEnvelope::summary(&body).unwrap_or(body);
        tracing::error!(
            operation,
            status = status.as_u16(),
            error = %detail,
            "Gateway answered with an error"
        );
        GatewayError::non_success(status.as_u16(), detail)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CreatedCustomer, GatewayError> {
        let body = CustomerBody::from(request);
        let response = self
            .send(
                "create_customer",
                self.http_client.post(self.url("/customers")).json(&body),
            )
            .await?;
        let resource: CustomerResource = Self::decode("create_customer", response).await?;
        Ok(resource.into())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError> {
        let body = SubscriptionBody::from(request);
        let response = self
            .send(
                "create_subscription",
                self.http_client.post(self.url("/subscriptions")).json(&body),
            )
            .await?;
        let resource: SubscriptionResource = Self::decode("create_subscription", response).await?;
        Ok(resource.into())
    }

    async fn cancel_subscription(&self, gateway_subscription_id: &str) -> Result<(), GatewayError> {
        let url = self.url(&format!("/subscriptions/{}", gateway_subscription_id));
        let response = self
            .send("cancel_subscription", self.http_client.delete(url))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::non_success("cancel_subscription", status, response).await);
        }
        Ok(())
    }

    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        let body = PaymentBody::from(request);
        let response = self
            .send(
                "create_payment",
                self.http_client.post(self.url("/payments")).json(&body),
            )
            .await?;
        let resource: PaymentResource = Self::decode("create_payment", response).await?;
        Ok(resource.into())
    }

    async fn get_payment(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<GatewayPayment>, GatewayError> {
        let url = self.url(&format!("/payments/{}", gateway_payment_id));
        let response = self.send("get_payment", self.http_client.get(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resource: PaymentResource = Self::decode("get_payment", response).await?;
        Ok(Some(resource.into()))
    }

    async fn list_installment_payments(
        &self,
        gateway_installment_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        let request = self
            .http_client
            .get(self.url("/payments"))
            .query(&[("installment", gateway_installment_id)]);
        let response = self.send("list_installment_payments", request).await?;
        let page: ListResource<PaymentResource> =
            Self::decode("list_installment_payments", response).await?;
        if page.has_more {
            tracing::warn!(
                installment_id = %gateway_installment_id,
                "Installment listing was paginated; only the first page is recorded"
            );
        }

        let mut payments: Vec<GatewayPayment> = page.data.into_iter().map(Into::into).collect();
        payments.sort_by_key(|payment| payment.due_date);
        Ok(payments)
    }

    async fn get_pix_qr_code(&self, gateway_payment_id: &str) -> Result<PixQrCode, GatewayError> {
        let url = self.url(&format!("/payments/{}/pixQrCode", gateway_payment_id));
        let response = self
            .send("get_pix_qr_code", self.http_client.get(url))
            .await?;
        let resource: PixQrCodeResource = Self::decode("get_pix_qr_code", response).await?;
        Ok(resource.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::GatewayErrorCode;

    fn gateway(base_url: &str) -> HttpPaymentGateway {
        HttpPaymentGateway::with_timeout(
            base_url,
            SecretString::new("$aact_test".to_string()),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let gateway = gateway("https://sandbox.gateway.test/v3/");
        assert_eq!(gateway.url("/payments"), "https://sandbox.gateway.test/v3/payments");
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_retryable_error() {
        // Port 9 (discard) on localhost is not expected to accept connections.
        let gateway = gateway("http://127.0.0.1:9");

        let err = gateway.get_payment("pay_1").await.unwrap_err();

        assert!(matches!(
            err.code,
            GatewayErrorCode::Network | GatewayErrorCode::Timeout
        ));
        assert!(err.retryable);
    }
}
