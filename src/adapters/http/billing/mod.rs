//! HTTP adapter for billing endpoints.
//!
//! Exposes the billing application layer via REST API:
//! - `POST /api/billing/subscriptions` - Subscribe to monthly dues
//! - `DELETE /api/billing/subscriptions/:id` - Cancel a subscription
//! - `POST /api/billing/event-payments` - Charge an event fee
//! - `GET /api/billing/payments` - Caller's payments
//! - `GET /api/billing/payments/:id/pix` - PIX QR code
//! - `GET /api/billing/admin/members/:id/payments` - Member payments (admin)
//! - `POST /api/billing/admin/payments/:id/received` - Manual receipt (admin)
//! - `POST /api/billing/admin/transactions` - Manual ledger line (admin)
//! - `GET /api/billing/admin/summary` - Financial summary (admin)
//! - `POST /api/webhooks/gateway` - Gateway notifications

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{
    AuthenticatedMember, BillingApiError, BillingAppState, WebhookApiError, MEMBER_ID_HEADER,
    MEMBER_ROLE_HEADER,
};
pub use routes::{admin_routes, billing_router, billing_routes, service_router, webhook_routes};
