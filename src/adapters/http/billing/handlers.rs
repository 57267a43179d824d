//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::response::IntoResponse;
use http::{HeaderMap, StatusCode};
use uuid::Uuid;

use crate::application::handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CreateEventPaymentCommand,
    CreateEventPaymentHandler, DuesTerms, GetFinancialSummaryHandler, GetFinancialSummaryQuery,
    GetPixQrCodeHandler, GetPixQrCodeQuery, HandleGatewayWebhookCommand,
    HandleGatewayWebhookHandler, ListMemberPaymentsHandler, ListMemberPaymentsQuery,
    MarkPaymentReceivedCommand, MarkPaymentReceivedHandler, RecordFinancialTransactionCommand,
    RecordFinancialTransactionHandler, SubscribeMemberCommand, SubscribeMemberHandler,
};
use crate::domain::billing::{
    BillingError, EligibilityPolicy, ManualEntry, MemberRole, RequestContext, WebhookError,
    WebhookVerifier, SIGNATURE_HEADER,
};
use crate::domain::foundation::{DomainError, MemberId, PaymentId, RegistrationId, SubscriptionId};
use crate::ports::{LedgerStore, MemberDirectory, PaymentGateway, WebhookEventRepository};

use super::dto::{
    CreateEventPaymentRequest, ErrorResponse, FinancialSummaryResponse, HealthResponse,
    PaymentListResponse, PaymentResponse, PixQrCodeResponse, RecordTransactionRequest,
    SubscribeRequest, SubscriptionResponse, SummaryParams, TransactionResponse,
    WebhookAckResponse,
};

/// Header carrying the authenticated member id.
pub const MEMBER_ID_HEADER: &str = "x-member-id";

/// Header carrying the caller's role; only `admin` is recognised.
pub const MEMBER_ROLE_HEADER: &str = "x-member-role";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned for each request; handlers are built on demand from it.
#[derive(Clone)]
pub struct BillingAppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub members: Arc<dyn MemberDirectory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub eligibility: EligibilityPolicy,
    pub dues: DuesTerms,
    /// When `None`, webhook signatures are not checked.
    pub webhook_verifier: Option<WebhookVerifier>,
}

impl BillingAppState {
    pub fn subscribe_member_handler(&self) -> SubscribeMemberHandler {
        SubscribeMemberHandler::new(
            self.members.clone(),
            self.ledger.clone(),
            self.gateway.clone(),
            self.eligibility.clone(),
            self.dues.clone(),
        )
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.ledger.clone(), self.gateway.clone())
    }

    pub fn create_event_payment_handler(&self) -> CreateEventPaymentHandler {
        CreateEventPaymentHandler::new(
            self.members.clone(),
            self.ledger.clone(),
            self.gateway.clone(),
        )
    }

    pub fn list_member_payments_handler(&self) -> ListMemberPaymentsHandler {
        ListMemberPaymentsHandler::new(self.ledger.clone())
    }

    pub fn pix_qr_code_handler(&self) -> GetPixQrCodeHandler {
        GetPixQrCodeHandler::new(self.ledger.clone(), self.gateway.clone())
    }

    pub fn mark_payment_received_handler(&self) -> MarkPaymentReceivedHandler {
        MarkPaymentReceivedHandler::new(self.ledger.clone())
    }

    pub fn record_transaction_handler(&self) -> RecordFinancialTransactionHandler {
        RecordFinancialTransactionHandler::new(self.ledger.clone())
    }

    pub fn financial_summary_handler(&self) -> GetFinancialSummaryHandler {
        GetFinancialSummaryHandler::new(self.ledger.clone())
    }

    pub fn webhook_handler(&self) -> HandleGatewayWebhookHandler {
        HandleGatewayWebhookHandler::new(
            self.ledger.clone(),
            self.webhook_events.clone(),
            self.webhook_verifier.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Caller Context (set by the upstream auth proxy)
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated caller extracted from request headers.
///
/// Session handling lives upstream; this service trusts `X-Member-Id` and
/// `X-Member-Role` as forwarded by the gateway in front of it.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedMember {
    pub ctx: RequestContext,
}

/// Rejection type for AuthenticatedMember extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedMember
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let member_id = parts
                .headers
                .get(MEMBER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .map(MemberId::from_uuid)
                .ok_or(AuthenticationRequired)?;

            let role = match parts
                .headers
                .get(MEMBER_ROLE_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                Some(role) if role.trim().eq_ignore_ascii_case("admin") => MemberRole::Admin,
                _ => MemberRole::Member,
            };

            Ok(AuthenticatedMember {
                ctx: RequestContext { member_id, role },
            })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Member Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/subscriptions - Subscribe a member to monthly dues
pub async fn subscribe(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
    Json(request): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.subscribe_member_handler();
    let cmd = SubscribeMemberCommand {
        ctx: caller.ctx,
        member_id: request
            .member_id
            .map(MemberId::from_uuid)
            .unwrap_or(caller.ctx.member_id),
        billing_type: request.billing_type,
    };

    let subscription = handler.handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(subscription)),
    ))
}

/// DELETE /api/billing/subscriptions/:id - Cancel a subscription
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.cancel_subscription_handler();
    let cmd = CancelSubscriptionCommand {
        ctx: caller.ctx,
        subscription_id: SubscriptionId::from_uuid(subscription_id),
    };

    let subscription = handler.handle(cmd).await?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// POST /api/billing/event-payments - Charge an event registration fee
pub async fn create_event_payment(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
    Json(request): Json<CreateEventPaymentRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.create_event_payment_handler();
    let cmd = CreateEventPaymentCommand {
        ctx: caller.ctx,
        member_id: request
            .member_id
            .map(MemberId::from_uuid)
            .unwrap_or(caller.ctx.member_id),
        registration_id: RegistrationId::from_uuid(request.registration_id),
        amount: request.amount,
        billing_type: request.billing_type,
        due_date: request.due_date,
        description: request.description,
        installment_count: request.installment_count,
    };

    let payment = handler.handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(PaymentResponse::from(payment))))
}

/// GET /api/billing/payments - List the caller's own payments
pub async fn list_my_payments(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.list_member_payments_handler();
    let query = ListMemberPaymentsQuery {
        ctx: caller.ctx,
        member_id: caller.ctx.member_id,
    };

    let payments = handler.handle(query).await?;

    Ok(Json(PaymentListResponse::from(payments)))
}

/// GET /api/billing/payments/:id/pix - PIX QR code of a payment
pub async fn get_pix_qr_code(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.pix_qr_code_handler();
    let query = GetPixQrCodeQuery {
        ctx: caller.ctx,
        payment_id: PaymentId::from_uuid(payment_id),
    };

    let qr_code = handler.handle(query).await?;

    Ok(Json(PixQrCodeResponse::from(qr_code)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Admin Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/admin/members/:id/payments - List any member's payments
pub async fn list_member_payments(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
    Path(member_id): Path<Uuid>,
) -> Result<impl IntoResponse, BillingApiError> {
    caller.ctx.require_admin()?;

    let handler = state.list_member_payments_handler();
    let query = ListMemberPaymentsQuery {
        ctx: caller.ctx,
        member_id: MemberId::from_uuid(member_id),
    };

    let payments = handler.handle(query).await?;

    Ok(Json(PaymentListResponse::from(payments)))
}

/// POST /api/billing/admin/payments/:id/received - Record an out-of-band payment
pub async fn mark_payment_received(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.mark_payment_received_handler();
    let cmd = MarkPaymentReceivedCommand {
        ctx: caller.ctx,
        payment_id: PaymentId::from_uuid(payment_id),
    };

    let payment = handler.handle(cmd).await?;

    Ok(Json(PaymentResponse::from(payment)))
}

/// POST /api/billing/admin/transactions - Book a manual ledger line
pub async fn record_transaction(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
    Json(request): Json<RecordTransactionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.record_transaction_handler();
    let cmd = RecordFinancialTransactionCommand {
        ctx: caller.ctx,
        entry: ManualEntry {
            kind: request.kind,
            amount: request.amount,
            category: request.category,
            description: request.description,
            occurred_on: request.occurred_on,
            member_id: request.member_id.map(MemberId::from_uuid),
        },
    };

    let transaction = handler.handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse::from(transaction)),
    ))
}

/// GET /api/billing/admin/summary?from=&to= - Ledger totals
pub async fn get_financial_summary(
    State(state): State<BillingAppState>,
    caller: AuthenticatedMember,
    Query(params): Query<SummaryParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.financial_summary_handler();
    let query = GetFinancialSummaryQuery {
        ctx: caller.ctx,
        from: params.from,
        to: params.to,
    };

    let summary = handler.handle(query).await?;

    Ok(Json(FinancialSummaryResponse::from(summary)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook & Health
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/gateway - Handle gateway notifications
///
/// 2xx acknowledges the delivery; 5xx asks the gateway to redeliver.
pub async fn handle_gateway_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let handler = state.webhook_handler();
    let cmd = HandleGatewayWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(WebhookAckResponse::from(result)))
}

/// GET /health - Liveness check
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self(BillingError::from(err))
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            BillingError::Ineligible { .. } | BillingError::Forbidden => StatusCode::FORBIDDEN,
            BillingError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BillingError::MemberNotFound(_)
            | BillingError::SubscriptionNotFound(_)
            | BillingError::PaymentNotFound(_)
            | BillingError::UnknownReference(_) => StatusCode::NOT_FOUND,
            BillingError::AlreadySubscribed(_) | BillingError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            BillingError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            BillingError::GatewayUnavailable(_) | BillingError::GatewayCustomerFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            BillingError::Conflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            BillingError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self.0, status = %status, "Billing request failed");
        }

        let body = ErrorResponse::new(self.0.code().to_string(), self.0.message());
        (status, Json(body)).into_response()
    }
}

/// API error type for the webhook endpoint.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        let message = match &self.0 {
            WebhookError::Database(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        if self.0.is_retryable() {
            tracing::warn!(error = %self.0, status = %status, "Webhook left for redelivery");
        }
        (status, Json(ErrorResponse::new(self.0.code(), message))).into_response()
    }
}
