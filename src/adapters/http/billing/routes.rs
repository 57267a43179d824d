//! Axum router configuration for billing endpoints.
//!
//! This module defines the route structure for billing API endpoints
//! and wires them to their corresponding handlers.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use http::StatusCode;
use tower_http::timeout::TimeoutLayer;

use super::dto::ErrorResponse;
use super::handlers::{
    cancel_subscription, create_event_payment, get_financial_summary, get_pix_qr_code,
    handle_gateway_webhook, health, list_member_payments, list_my_payments,
    mark_payment_received, record_transaction, subscribe, BillingAppState,
};

/// Create the member-scoped billing router.
///
/// # Routes
/// - `POST /subscriptions` - Subscribe to monthly dues
/// - `DELETE /subscriptions/:id` - Cancel a subscription
/// - `POST /event-payments` - Charge an event registration fee
/// - `GET /payments` - Caller's own payments
/// - `GET /payments/:id/pix` - PIX QR code of a payment
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/subscriptions", post(subscribe))
        .route("/subscriptions/:id", delete(cancel_subscription))
        .route("/event-payments", post(create_event_payment))
        .route("/payments", get(list_my_payments))
        .route("/payments/:id/pix", get(get_pix_qr_code))
}

/// Create the admin billing router.
///
/// # Routes
/// - `GET /members/:id/payments` - Any member's payments
/// - `POST /payments/:id/received` - Record an out-of-band payment
/// - `POST /transactions` - Book a manual ledger line
/// - `GET /summary` - Ledger totals, optional `from`/`to` dates
pub fn admin_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/members/:id/payments", get(list_member_payments))
        .route("/payments/:id/received", post(mark_payment_received))
        .route("/transactions", post(record_transaction))
        .route("/summary", get(get_financial_summary))
}

/// Create the gateway webhook router.
///
/// Separate from the billing routes because webhooks carry no member
/// context; they are authenticated by signature.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/gateway", post(handle_gateway_webhook))
}

/// Create the complete service router.
///
/// ```ignore
/// let app = billing_router().with_state(state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/billing", billing_routes().nest("/admin", admin_routes()))
        .nest("/api/webhooks", webhook_routes())
}

/// Create the complete service with request budgets applied.
///
/// API routes answer 408 once `request_timeout` elapses. The webhook route
/// is outside that layer: it gets the same budget but answers 503, which
/// the gateway treats as a retryable failure. An interrupted delivery stays
/// recorded and unprocessed, so the redelivery resumes it.
pub fn service_router(state: BillingAppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .nest("/api/billing", billing_routes().nest("/admin", admin_routes()))
        .layer(TimeoutLayer::new(request_timeout));

    let webhooks = webhook_routes().layer(middleware::from_fn_with_state(
        request_timeout,
        webhook_deadline,
    ));

    api.nest("/api/webhooks", webhooks).with_state(state)
}

async fn webhook_deadline(
    State(budget): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(budget, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(?budget, "Webhook processing exceeded its budget");
            let error = ErrorResponse::new(
                "WEBHOOK_TIMEOUT",
                "Webhook processing timed out, retry the delivery",
            );
            (StatusCode::SERVICE_UNAVAILABLE, Json(error)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::gateway::MockPaymentGateway;
    use crate::adapters::memory::{
        InMemoryLedgerStore, InMemoryMemberDirectory, InMemoryWebhookEventRepository,
    };
    use crate::application::handlers::billing::DuesTerms;
    use crate::domain::billing::{EligibilityPolicy, Rank};

    fn test_state() -> BillingAppState {
        BillingAppState {
            ledger: Arc::new(InMemoryLedgerStore::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
            members: Arc::new(InMemoryMemberDirectory::new()),
            gateway: Arc::new(MockPaymentGateway::new()),
            eligibility: EligibilityPolicy::new([Rank::Soldado]),
            dues: DuesTerms::default(),
            webhook_verifier: None,
        }
    }

    #[test]
    fn billing_routes_creates_router() {
        let _: Router<()> = billing_routes().with_state(test_state());
    }

    #[test]
    fn admin_routes_creates_router() {
        let _: Router<()> = admin_routes().with_state(test_state());
    }

    #[test]
    fn webhook_routes_creates_router() {
        let _: Router<()> = webhook_routes().with_state(test_state());
    }

    #[test]
    fn billing_router_creates_combined_router() {
        let _: Router<()> = billing_router().with_state(test_state());
    }

    #[test]
    fn service_router_applies_budgets() {
        let _: Router<()> = service_router(test_state(), Duration::from_secs(30));
    }
}
