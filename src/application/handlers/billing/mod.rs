//! Billing handlers.
//!
//! ## Commands
//! - Subscribing a member to monthly dues
//! - Cancelling a subscription
//! - Creating event fee charges
//! - Processing gateway webhooks
//! - Marking a payment received (admin)
//! - Recording manual ledger lines (admin)
//!
//! ## Queries
//! - Listing a member's payments
//! - Financial summary (admin)
//! - PIX QR code of a payment

mod cancel_subscription;
mod create_event_payment;
mod gateway_customer;
mod get_financial_summary;
mod get_pix_qr_code;
mod handle_gateway_webhook;
mod list_member_payments;
mod mark_payment_received;
mod record_financial_transaction;
mod subscribe_member;

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_event_payment::{
    CreateEventPaymentCommand, CreateEventPaymentHandler, CreateEventPaymentResult,
};
pub use handle_gateway_webhook::{
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, HandleGatewayWebhookResult,
    WebhookOutcome,
};
pub use mark_payment_received::{
    MarkPaymentReceivedCommand, MarkPaymentReceivedHandler, MarkPaymentReceivedResult,
};
pub use record_financial_transaction::{
    RecordFinancialTransactionCommand, RecordFinancialTransactionHandler,
    RecordFinancialTransactionResult,
};
pub use subscribe_member::{
    DuesTerms, SubscribeMemberCommand, SubscribeMemberHandler, SubscribeMemberResult,
};

// Queries
pub use get_financial_summary::{
    GetFinancialSummaryHandler, GetFinancialSummaryQuery, GetFinancialSummaryResult,
};
pub use get_pix_qr_code::{GetPixQrCodeHandler, GetPixQrCodeQuery, GetPixQrCodeResult};
pub use list_member_payments::{
    ListMemberPaymentsHandler, ListMemberPaymentsQuery, ListMemberPaymentsResult,
};
