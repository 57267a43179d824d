//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing domain and the outside world. Adapters implement these ports.
//!
//! - `PaymentGateway` - External payment gateway (customers, subscriptions, charges)
//! - `LedgerStore` - Customers, subscriptions, payments and financial ledger
//! - `WebhookEventRepository` - Webhook audit trail and deduplication
//! - `MemberDirectory` - Read access to member profiles

mod ledger_store;
mod member_directory;
mod payment_gateway;
mod webhook_event_repository;

pub use ledger_store::{LedgerStore, PaymentUpdate, SubscriptionUpdate};
pub use member_directory::MemberDirectory;
pub use payment_gateway::{
    CreateCustomerRequest, CreatePaymentRequest, CreateSubscriptionRequest, CreatedCustomer,
    GatewayError, GatewayErrorCode, GatewayPayment, GatewaySubscription, PaymentGateway,
    PixQrCode,
};
pub use webhook_event_repository::{RecordOutcome, WebhookEventRecord, WebhookEventRepository};
