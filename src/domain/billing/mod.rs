//! Billing domain module.
//!
//! Dues subscriptions, one-off event fees, their payment lifecycle and the
//! income they produce in the financial ledger.
//!
//! # Module Structure
//!
//! - `status` - Payment and subscription state machines
//! - `transition` - Outcome of a requested status change
//! - `payment` - Payment entity and the effects of settling it
//! - `subscription` - Subscription and gateway customer records
//! - `ledger` - Financial transactions and summaries
//! - `billing_type` - Closed set of billing types and their capabilities
//! - `rank` - Member ranks and the dues eligibility allow-list
//! - `gateway_event` - Webhook envelope and event vocabulary
//! - `webhook_verifier` - HMAC signature checks

mod billing_type;
mod errors;
mod gateway_event;
mod ledger;
mod member;
mod payment;
mod rank;
mod status;
mod subscription;
mod transition;
mod webhook_errors;
mod webhook_verifier;

pub use billing_type::{BillingCapabilities, BillingType};
pub use errors::BillingError;
pub use gateway_event::{
    GatewayEvent, GatewayEventKind, PaymentPayload, SubscriptionPayload, WebhookEffect,
};
pub use ledger::{
    money, FinancialSummary, FinancialTransaction, ManualEntry, SummaryPeriod, TransactionKind,
    CATEGORY_EVENT_FEE, CATEGORY_MONTHLY_DUES,
};
pub use member::{MemberProfile, MemberRole, RequestContext};
pub use payment::{InstallmentPlan, NewPayment, Payment, PaymentArtifacts, PaymentEffects};
pub use rank::{EligibilityPolicy, Rank};
pub use status::{PaymentStatus, SubscriptionStatus};
pub use subscription::{BillingCycle, GatewayCustomer, NewSubscription, Subscription};
pub use transition::{Transition, TransitionSource};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{
    sign_payload, SignatureHeader, WebhookVerifier, SIGNATURE_HEADER,
};
