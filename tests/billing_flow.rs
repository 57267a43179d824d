//! Integration tests for the billing flow.
//!
//! These tests drive the application handlers end to end over the
//! in-memory adapters and the mock gateway:
//! 1. Subscribing, installment notifications and income recognition
//! 2. Replays, unknown references and signature checks
//! 3. Reconciliation recovering a lost notification
//! 4. Concurrent deliveries for the same charge
//! 5. Event fees split into installments
//! 6. Resuming a delivery whose first attempt failed mid-apply

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::json;

use quartel_billing::adapters::gateway::MockPaymentGateway;
use quartel_billing::adapters::memory::{
    InMemoryLedgerStore, InMemoryMemberDirectory, InMemoryWebhookEventRepository,
};
use quartel_billing::application::handlers::billing::{
    CreateEventPaymentCommand, CreateEventPaymentHandler, DuesTerms, HandleGatewayWebhookCommand,
    HandleGatewayWebhookHandler, ListMemberPaymentsHandler, ListMemberPaymentsQuery,
    SubscribeMemberCommand, SubscribeMemberHandler, WebhookOutcome,
};
use quartel_billing::application::{ReconciliationConfig, ReconciliationSweep};
use quartel_billing::domain::billing::{
    sign_payload, BillingError, BillingType, EligibilityPolicy, MemberProfile, Payment,
    PaymentStatus, Rank, RequestContext, Subscription, SummaryPeriod, TransactionKind,
    WebhookError, WebhookVerifier, CATEGORY_EVENT_FEE, CATEGORY_MONTHLY_DUES,
};
use quartel_billing::domain::foundation::{MemberId, RegistrationId};
use quartel_billing::ports::{
    GatewayError, GatewayPayment, LedgerStore, PaymentGateway, WebhookEventRepository,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

const SECRET: &str = "whsec_integration";

struct World {
    ledger: Arc<InMemoryLedgerStore>,
    events: Arc<InMemoryWebhookEventRepository>,
    directory: Arc<InMemoryMemberDirectory>,
    gateway: Arc<MockPaymentGateway>,
}

impl World {
    fn new() -> Self {
        Self::with_ledger(InMemoryLedgerStore::new())
    }

    fn with_ledger(ledger: InMemoryLedgerStore) -> Self {
        Self {
            ledger: Arc::new(ledger),
            events: Arc::new(InMemoryWebhookEventRepository::new()),
            directory: Arc::new(InMemoryMemberDirectory::new()),
            gateway: Arc::new(MockPaymentGateway::new()),
        }
    }

    fn subscribe_handler(&self) -> SubscribeMemberHandler {
        SubscribeMemberHandler::new(
            self.directory.clone(),
            self.ledger.clone(),
            self.gateway.clone(),
            EligibilityPolicy::new([Rank::Soldado, Rank::Cabo, Rank::Sargento]),
            DuesTerms::default(),
        )
    }

    fn webhook_handler(&self, verifier: Option<WebhookVerifier>) -> HandleGatewayWebhookHandler {
        HandleGatewayWebhookHandler::new(self.ledger.clone(), self.events.clone(), verifier)
    }

    fn sweep(&self) -> ReconciliationSweep {
        ReconciliationSweep::with_config(
            self.ledger.clone(),
            self.gateway.clone(),
            ReconciliationConfig::default().with_grace_days(3),
        )
    }

    async fn member(&self, rank: Rank) -> MemberId {
        let id = MemberId::new();
        self.directory
            .insert(MemberProfile {
                id,
                name: "Carlos Souza".to_string(),
                email: "carlos@example.com".to_string(),
                tax_id: "52998224725".to_string(),
                phone: Some("11987654321".to_string()),
                rank,
            })
            .await;
        id
    }

    async fn subscribe(&self, member: MemberId) -> Subscription {
        self.subscribe_handler()
            .handle(SubscribeMemberCommand {
                ctx: RequestContext::member(member),
                member_id: member,
                billing_type: None,
            })
            .await
            .unwrap()
    }

    async fn charge_event(
        &self,
        member: MemberId,
        amount: Decimal,
        billing_type: BillingType,
        installment_count: Option<u8>,
    ) -> Payment {
        CreateEventPaymentHandler::new(
            self.directory.clone(),
            self.ledger.clone(),
            self.gateway.clone(),
        )
        .handle(CreateEventPaymentCommand {
            ctx: RequestContext::member(member),
            member_id: member,
            registration_id: RegistrationId::new(),
            amount,
            billing_type,
            due_date: NaiveDate::from_ymd_opt(2026, 11, 10).unwrap(),
            description: "Jantar anual".to_string(),
            installment_count,
        })
        .await
        .unwrap()
    }

    async fn total_income(&self) -> Decimal {
        self.ledger
            .financial_summary(SummaryPeriod::default())
            .await
            .unwrap()
            .total_income
    }

    /// The installment the gateway issued together with the subscription.
    fn first_installment(&self, subscription: &Subscription) -> GatewayPayment {
        self.gateway
            .payments_for_subscription(&subscription.gateway_subscription_id)
            .into_iter()
            .next()
            .unwrap()
    }
}

fn payment_event(event_id: &str, event: &str, payment: &GatewayPayment) -> Vec<u8> {
    json!({
        "id": event_id,
        "event": event,
        "payment": {
            "id": payment.id,
            "customer": payment.customer_id,
            "subscription": payment.subscription_id,
            "installment": payment.installment_id,
            "value": payment.value,
            "billingType": payment.billing_type,
            "status": payment.status,
            "dueDate": payment.due_date,
            "invoiceUrl": payment.invoice_url
        }
    })
    .to_string()
    .into_bytes()
}

fn unsigned(payload: Vec<u8>) -> HandleGatewayWebhookCommand {
    HandleGatewayWebhookCommand {
        payload,
        signature: None,
    }
}

// =============================================================================
// Subscription and settlement
// =============================================================================

#[tokio::test]
async fn soldado_subscribes_and_settlement_books_dues_once() {
    let world = World::new();
    let member = world.member(Rank::Soldado).await;

    let subscription = world.subscribe(member).await;
    assert!(subscription.is_active());
    assert_eq!(subscription.amount, Decimal::new(1000, 2));

    let installment = world.first_installment(&subscription);
    let webhooks = world.webhook_handler(None);

    let created = webhooks
        .handle(unsigned(payment_event("evt_1", "PAYMENT_CREATED", &installment)))
        .await
        .unwrap();
    assert_eq!(created.outcome, WebhookOutcome::Recorded);

    let received = webhooks
        .handle(unsigned(payment_event("evt_2", "payment-received", &installment)))
        .await
        .unwrap();
    assert_eq!(received.outcome, WebhookOutcome::Applied);

    let payment = world
        .ledger
        .find_payment_by_gateway_id(&installment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Received);
    assert_eq!(payment.subscription_id, Some(subscription.id));
    assert_eq!(payment.member_id, member);

    let lines = world.ledger.all_transactions().await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].kind, TransactionKind::Income);
    assert_eq!(lines[0].amount.to_string(), "10.00");
    assert_eq!(lines[0].category, CATEGORY_MONTHLY_DUES);

    let history = ListMemberPaymentsHandler::new(world.ledger.clone())
        .handle(ListMemberPaymentsQuery {
            ctx: RequestContext::member(member),
            member_id: member,
        })
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn recruta_is_refused_without_gateway_calls() {
    let world = World::new();
    let member = world.member(Rank::Recruta).await;

    let err = world
        .subscribe_handler()
        .handle(SubscribeMemberCommand {
            ctx: RequestContext::member(member),
            member_id: member,
            billing_type: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Ineligible { rank: Rank::Recruta, .. }));
    assert!(world.gateway.calls().is_empty());
    assert!(world.ledger.find_active_subscription(member).await.unwrap().is_none());
}

#[tokio::test]
async fn second_subscription_is_refused() {
    let world = World::new();
    let member = world.member(Rank::Cabo).await;
    world.subscribe(member).await;

    let err = world
        .subscribe_handler()
        .handle(SubscribeMemberCommand {
            ctx: RequestContext::member(member),
            member_id: member,
            billing_type: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::AlreadySubscribed(id) if id == member));
    assert_eq!(world.gateway.call_count("create_subscription"), 1);
}

// =============================================================================
// Webhook delivery semantics
// =============================================================================

#[tokio::test]
async fn replayed_settlement_has_no_further_effect() {
    let world = World::new();
    let member = world.member(Rank::Soldado).await;
    let subscription = world.subscribe(member).await;
    let installment = world.first_installment(&subscription);
    let webhooks = world.webhook_handler(None);
    let payload = payment_event("evt_paid", "PAYMENT_RECEIVED", &installment);

    webhooks.handle(unsigned(payload.clone())).await.unwrap();
    for _ in 0..5 {
        let again = webhooks.handle(unsigned(payload.clone())).await.unwrap();
        assert_eq!(again.outcome, WebhookOutcome::Duplicate);
    }

    assert_eq!(world.ledger.all_transactions().await.len(), 1);
    assert_eq!(world.events.len().await, 1);
}

#[tokio::test]
async fn unknown_reference_is_acknowledged_without_mutation() {
    let world = World::new();
    let orphan = GatewayPayment {
        id: "pay_orphan".to_string(),
        customer_id: Some("cus_unknown".to_string()),
        subscription_id: None,
        installment_id: None,
        status: "RECEIVED".to_string(),
        value: Decimal::new(2500, 2),
        net_value: None,
        billing_type: BillingType::Pix,
        due_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        invoice_url: None,
        bank_slip_url: None,
        deleted: false,
    };

    let result = world
        .webhook_handler(None)
        .handle(unsigned(payment_event("evt_orphan", "PAYMENT_RECEIVED", &orphan)))
        .await
        .unwrap();

    assert_eq!(result.outcome, WebhookOutcome::UnknownReference);
    assert_eq!(world.ledger.payment_count().await, 0);
    assert!(world.ledger.all_transactions().await.is_empty());
    assert_eq!(world.events.len().await, 1);
}

#[tokio::test]
async fn forged_signature_is_rejected_and_not_recorded() {
    let world = World::new();
    let member = world.member(Rank::Soldado).await;
    let subscription = world.subscribe(member).await;
    let installment = world.first_installment(&subscription);
    let verifier = WebhookVerifier::new(SecretString::new(SECRET.to_string()), 300, 60);
    let webhooks = world.webhook_handler(Some(verifier));
    let payload = payment_event("evt_forged", "PAYMENT_RECEIVED", &installment);

    let forged = sign_payload("not-the-secret", chrono::Utc::now().timestamp(), &payload);
    let err = webhooks
        .handle(HandleGatewayWebhookCommand {
            payload: payload.clone(),
            signature: Some(forged),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::InvalidSignature));
    assert!(world.events.is_empty().await);
    assert!(world.ledger.all_transactions().await.is_empty());

    let genuine = sign_payload(SECRET, chrono::Utc::now().timestamp(), &payload);
    let result = webhooks
        .handle(HandleGatewayWebhookCommand {
            payload,
            signature: Some(genuine),
        })
        .await
        .unwrap();
    assert_eq!(result.outcome, WebhookOutcome::Applied);
    assert_eq!(world.ledger.all_transactions().await.len(), 1);
}

#[tokio::test]
async fn concurrent_confirmed_and_received_end_received_with_one_income() {
    let world = World::new();
    let member = world.member(Rank::Soldado).await;
    let subscription = world.subscribe(member).await;
    let installment = world.first_installment(&subscription);
    let webhooks = Arc::new(world.webhook_handler(None));

    let confirmed = {
        let webhooks = webhooks.clone();
        let payload = payment_event("evt_confirmed", "PAYMENT_CONFIRMED", &installment);
        tokio::spawn(async move { webhooks.handle(unsigned(payload)).await })
    };
    let received = {
        let webhooks = webhooks.clone();
        let payload = payment_event("evt_received", "PAYMENT_RECEIVED", &installment);
        tokio::spawn(async move { webhooks.handle(unsigned(payload)).await })
    };

    assert!(confirmed.await.unwrap().is_ok());
    assert!(received.await.unwrap().is_ok());

    let payment = world
        .ledger
        .find_payment_by_gateway_id(&installment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Received);
    assert_eq!(world.ledger.all_transactions().await.len(), 1);
    assert_eq!(world.ledger.payment_count().await, 1);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn sweep_recovers_lost_settlement_and_late_webhook_is_harmless() {
    let world = World::new();
    let member = world.member(Rank::Sargento).await;
    let subscription = world.subscribe(member).await;
    let installment = world.first_installment(&subscription);
    let webhooks = world.webhook_handler(None);

    webhooks
        .handle(unsigned(payment_event("evt_created", "PAYMENT_CREATED", &installment)))
        .await
        .unwrap();

    // The settlement notification never arrives.
    assert!(world.gateway.simulate_status(&installment.id, "RECEIVED"));

    let today = installment.due_date.checked_add_days(Days::new(5)).unwrap();
    let report = world.sweep().sweep_once(today).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.advanced, 1);
    assert_eq!(report.failures, 0);

    let payment = world
        .ledger
        .find_payment_by_gateway_id(&installment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Received);
    assert_eq!(world.ledger.all_transactions().await.len(), 1);

    let late = webhooks
        .handle(unsigned(payment_event("evt_late", "PAYMENT_RECEIVED", &installment)))
        .await
        .unwrap();
    assert_eq!(late.outcome, WebhookOutcome::Unchanged);
    assert_eq!(world.ledger.all_transactions().await.len(), 1);

    let second_pass = world.sweep().sweep_once(today).await.unwrap();
    assert_eq!(second_pass.examined, 0);
}

#[tokio::test]
async fn sweep_ignores_payments_within_grace_period() {
    let world = World::new();
    let member = world.member(Rank::Soldado).await;
    let subscription = world.subscribe(member).await;
    let installment = world.first_installment(&subscription);

    world
        .webhook_handler(None)
        .handle(unsigned(payment_event("evt_created", "PAYMENT_CREATED", &installment)))
        .await
        .unwrap();
    world.gateway.simulate_status(&installment.id, "RECEIVED");

    let today = installment.due_date.checked_add_days(Days::new(1)).unwrap();
    let report = world.sweep().sweep_once(today).await.unwrap();

    assert_eq!(report.examined, 0);
    assert!(world.ledger.all_transactions().await.is_empty());
}

// =============================================================================
// Split event fees
// =============================================================================

#[tokio::test]
async fn split_event_fee_settles_registration_on_last_installment() {
    let world = World::new();
    let member = world.member(Rank::Recruta).await;

    let first = world
        .charge_event(member, Decimal::new(30000, 2), BillingType::CreditCard, Some(3))
        .await;
    let registration = first.registration_id.unwrap();
    assert_eq!(first.amount, Decimal::new(10000, 2));
    assert_eq!(world.ledger.payment_count().await, 3);

    let plan = first.installment.clone().unwrap();
    let installments = world
        .gateway
        .list_installment_payments(&plan.gateway_installment_id)
        .await
        .unwrap();
    assert_eq!(installments.len(), 3);

    let webhooks = world.webhook_handler(None);
    for (n, installment) in installments.iter().enumerate() {
        assert!(!world.ledger.is_registration_paid(registration).await);

        let result = webhooks
            .handle(unsigned(payment_event(
                &format!("evt_ins_{}", n),
                "PAYMENT_RECEIVED",
                installment,
            )))
            .await
            .unwrap();
        assert_eq!(result.outcome, WebhookOutcome::Applied);

        let settled = Decimal::new(10000, 2) * Decimal::from(n + 1);
        assert_eq!(world.total_income().await, settled);
    }

    assert!(world.ledger.is_registration_paid(registration).await);
    let lines = world.ledger.all_transactions().await;
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.category == CATEGORY_EVENT_FEE));
    assert_eq!(world.total_income().await, Decimal::new(30000, 2));
}

#[tokio::test]
async fn installments_missed_at_creation_are_recorded_from_webhooks() {
    let world = World::new();
    let member = world.member(Rank::Recruta).await;
    world.gateway.set_method_error(
        "list_installment_payments",
        GatewayError::non_success(502, "bad gateway"),
    );

    let first = world
        .charge_event(member, Decimal::new(30000, 2), BillingType::CreditCard, Some(3))
        .await;
    let registration = first.registration_id.unwrap();
    assert_eq!(world.ledger.payment_count().await, 1);

    world.gateway.clear_errors();
    let plan = first.installment.clone().unwrap();
    let installments = world
        .gateway
        .list_installment_payments(&plan.gateway_installment_id)
        .await
        .unwrap();

    let webhooks = world.webhook_handler(None);
    for (n, installment) in installments.iter().enumerate() {
        webhooks
            .handle(unsigned(payment_event(
                &format!("evt_late_{}", n),
                "PAYMENT_RECEIVED",
                installment,
            )))
            .await
            .unwrap();
    }

    assert_eq!(world.ledger.payment_count().await, 3);
    assert!(world.ledger.is_registration_paid(registration).await);
    assert_eq!(world.total_income().await, Decimal::new(30000, 2));
}

// =============================================================================
// Signature window
// =============================================================================

#[tokio::test]
async fn stale_and_future_signatures_are_rejected_without_effects() {
    let world = World::new();
    let member = world.member(Rank::Recruta).await;
    let fee = world
        .charge_event(member, Decimal::new(4500, 2), BillingType::Boleto, None)
        .await;
    let registration = fee.registration_id.unwrap();
    let remote = world.gateway.payment(&fee.gateway_payment_id).unwrap();
    let verifier = WebhookVerifier::new(SecretString::new(SECRET.to_string()), 300, 60);
    let webhooks = world.webhook_handler(Some(verifier));
    let payload = payment_event("evt_window", "PAYMENT_RECEIVED", &remote);
    let now = chrono::Utc::now().timestamp();

    let stale = sign_payload(SECRET, now - 3_600, &payload);
    let err = webhooks
        .handle(HandleGatewayWebhookCommand {
            payload: payload.clone(),
            signature: Some(stale),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::TimestampOutOfRange));

    let future = sign_payload(SECRET, now + 3_600, &payload);
    let err = webhooks
        .handle(HandleGatewayWebhookCommand {
            payload: payload.clone(),
            signature: Some(future),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::InvalidTimestamp));

    assert!(world.events.is_empty().await);
    assert_eq!(world.total_income().await, Decimal::ZERO);
    assert!(!world.ledger.is_registration_paid(registration).await);

    let fresh = sign_payload(SECRET, chrono::Utc::now().timestamp(), &payload);
    let result = webhooks
        .handle(HandleGatewayWebhookCommand {
            payload,
            signature: Some(fresh),
        })
        .await
        .unwrap();
    assert_eq!(result.outcome, WebhookOutcome::Applied);
    assert_eq!(world.total_income().await, Decimal::new(4500, 2));
    assert!(world.ledger.is_registration_paid(registration).await);
}

// =============================================================================
// Resuming failed deliveries
// =============================================================================

#[tokio::test]
async fn delivery_failing_mid_apply_is_resumed_on_redelivery() {
    let world = World::with_ledger(InMemoryLedgerStore::with_lock_timeout(
        Duration::from_millis(50),
    ));
    let member = world.member(Rank::Recruta).await;
    let fee = world
        .charge_event(member, Decimal::new(12000, 2), BillingType::Boleto, None)
        .await;
    let registration = fee.registration_id.unwrap();
    let remote = world.gateway.payment(&fee.gateway_payment_id).unwrap();
    let webhooks = world.webhook_handler(None);
    let payload = payment_event("evt_retry", "PAYMENT_RECEIVED", &remote);

    // A concurrent writer holds the row past the lock timeout.
    let held = world
        .ledger
        .lock_payment(&fee.gateway_payment_id)
        .await
        .unwrap();
    assert!(webhooks.handle(unsigned(payload.clone())).await.is_err());

    let pending = world
        .events
        .find_by_event_id("evt_retry")
        .await
        .unwrap()
        .unwrap();
    assert!(!pending.processed);
    assert_eq!(world.total_income().await, Decimal::ZERO);
    assert!(!world.ledger.is_registration_paid(registration).await);

    drop(held);
    let resumed = webhooks.handle(unsigned(payload.clone())).await.unwrap();
    assert_eq!(resumed.outcome, WebhookOutcome::Applied);

    let processed = world
        .events
        .find_by_event_id("evt_retry")
        .await
        .unwrap()
        .unwrap();
    assert!(processed.processed);
    assert_eq!(world.total_income().await, Decimal::new(12000, 2));
    assert!(world.ledger.is_registration_paid(registration).await);

    let replay = webhooks.handle(unsigned(payload)).await.unwrap();
    assert_eq!(replay.outcome, WebhookOutcome::Duplicate);
    assert_eq!(world.ledger.all_transactions().await.len(), 1);
}
