//! In-process payment gateway for tests and local development.
//!
//! Keeps customers, subscriptions and charges in memory, supports error
//! injection per method and records every call for assertions. Tests drive
//! gateway-side changes (a charge settling, an installment being issued)
//! through the `simulate_*` helpers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;

use crate::domain::billing::BillingType;
use crate::ports::{
    CreateCustomerRequest, CreatePaymentRequest, CreateSubscriptionRequest, CreatedCustomer,
    GatewayError, GatewayPayment, GatewaySubscription, PaymentGateway, PixQrCode,
};

/// Mock payment gateway.
///
/// Clones share state, so a test can keep a handle while the application
/// owns another.
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    customers: HashMap<String, CreateCustomerRequest>,
    subscriptions: HashMap<String, GatewaySubscription>,
    cancelled_subscriptions: HashSet<String>,
    payments: HashMap<String, GatewayPayment>,

    /// Error returned by every call to the named method.
    method_errors: HashMap<String, GatewayError>,

    /// Error returned by the next call to any method, then cleared.
    next_error: Option<GatewayError>,

    call_log: Vec<MethodCall>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_mock_{}", prefix, self.next_id)
    }
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error Injection
    // ════════════════════════════════════════════════════════════════════════════

    /// Fail the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.state().next_error = Some(error);
    }

    /// Fail every call to `method` until cleared.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Gateway-side Simulation
    // ════════════════════════════════════════════════════════════════════════════

    /// Issues a subscription installment, as the gateway does on each cycle.
    pub fn simulate_installment(
        &self,
        gateway_subscription_id: &str,
        due_date: NaiveDate,
    ) -> Option<GatewayPayment> {
        let mut state = self.state();
        let subscription = state.subscriptions.get(gateway_subscription_id)?.clone();
        let value = state
            .payments
            .values()
            .find(|p| p.subscription_id.as_deref() == Some(gateway_subscription_id))
            .map(|p| p.value);
        let id = state.next_id("pay");
        let payment = GatewayPayment {
            id: id.clone(),
            customer_id: Some(subscription.customer_id.clone()),
            subscription_id: Some(subscription.id.clone()),
            installment_id: None,
            status: "PENDING".to_string(),
            value: value.unwrap_or_default(),
            net_value: None,
            billing_type: BillingType::Undefined,
            due_date,
            invoice_url: Some(format!("https://gateway.mock/i/{}", id)),
            bank_slip_url: None,
            deleted: false,
        };
        state.payments.insert(id, payment.clone());
        Some(payment)
    }

    /// Puts a charge the gateway knows about into its store directly.
    pub fn add_payment(&self, payment: GatewayPayment) {
        self.state().payments.insert(payment.id.clone(), payment);
    }

    /// Changes a charge's gateway status without sending a webhook.
    pub fn simulate_status(&self, gateway_payment_id: &str, status: &str) -> bool {
        match self.state().payments.get_mut(gateway_payment_id) {
            Some(payment) => {
                payment.status = status.to_string();
                true
            }
            None => false,
        }
    }

    /// Charges issued for a subscription, oldest first.
    pub fn payments_for_subscription(&self, gateway_subscription_id: &str) -> Vec<GatewayPayment> {
        let mut payments: Vec<GatewayPayment> = self
            .state()
            .payments
            .values()
            .filter(|p| p.subscription_id.as_deref() == Some(gateway_subscription_id))
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));
        payments
    }

    pub fn payment(&self, gateway_payment_id: &str) -> Option<GatewayPayment> {
        self.state().payments.get(gateway_payment_id).cloned()
    }

    pub fn subscription(&self, gateway_subscription_id: &str) -> Option<GatewaySubscription> {
        self.state().subscriptions.get(gateway_subscription_id).cloned()
    }

    pub fn is_cancelled(&self, gateway_subscription_id: &str) -> bool {
        self.state()
            .cancelled_subscriptions
            .contains(gateway_subscription_id)
    }

    pub fn customer_count(&self) -> usize {
        self.state().customers.len()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), GatewayError> {
        let mut state = self.state();

        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CreatedCustomer, GatewayError> {
        self.record_call(
            "create_customer",
            vec![request.member_id.to_string(), request.email.clone()],
        );
        self.check_error("create_customer")?;

        let mut state = self.state();
        let id = state.next_id("cus");
        state.customers.insert(id.clone(), request);
        Ok(CreatedCustomer { id })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError> {
        self.record_call(
            "create_subscription",
            vec![request.customer_id.clone(), request.value.to_string()],
        );
        self.check_error("create_subscription")?;

        let mut state = self.state();
        if !state.customers.contains_key(&request.customer_id) {
            return Err(GatewayError::non_success(404, "customer not found"));
        }

        let subscription = GatewaySubscription {
            id: state.next_id("sub"),
            customer_id: request.customer_id.clone(),
            status: "ACTIVE".to_string(),
            next_due_date: request.next_due_date,
        };

        // The gateway issues the first installment together with the subscription.
        let payment_id = state.next_id("pay");
        state.payments.insert(
            payment_id.clone(),
            GatewayPayment {
                id: payment_id.clone(),
                customer_id: Some(request.customer_id),
                subscription_id: Some(subscription.id.clone()),
                installment_id: None,
                status: "PENDING".to_string(),
                value: request.value,
                net_value: None,
                billing_type: request.billing_type,
                due_date: request.next_due_date,
                invoice_url: Some(format!("https://gateway.mock/i/{}", payment_id)),
                bank_slip_url: None,
                deleted: false,
            },
        );

        state
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn cancel_subscription(&self, gateway_subscription_id: &str) -> Result<(), GatewayError> {
        self.record_call(
            "cancel_subscription",
            vec![gateway_subscription_id.to_string()],
        );
        self.check_error("cancel_subscription")?;

        let mut state = self.state();
        let Some(subscription) = state.subscriptions.get_mut(gateway_subscription_id) else {
            return Err(GatewayError::non_success(404, "subscription not found"));
        };
        subscription.status = "INACTIVE".to_string();
        state
            .cancelled_subscriptions
            .insert(gateway_subscription_id.to_string());
        Ok(())
    }

    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        self.record_call(
            "create_payment",
            vec![request.customer_id.clone(), request.value.to_string()],
        );
        self.check_error("create_payment")?;

        let mut state = self.state();
        let count = request.installment_count.filter(|count| *count > 1).unwrap_or(1);
        let installment_id = (count > 1).then(|| state.next_id("ins"));

        // Equal monthly parts; the last one absorbs the rounding remainder.
        let part = (request.value / Decimal::from(count)).round_dp(2);
        let mut issued = Vec::with_capacity(usize::from(count));
        for index in 0..count {
            let id = state.next_id("pay");
            let value = if index + 1 == count {
                request.value - part * Decimal::from(count - 1)
            } else {
                part
            };
            let due_date = request
                .due_date
                .checked_add_months(Months::new(u32::from(index)))
                .unwrap_or(request.due_date);
            let payment = GatewayPayment {
                id: id.clone(),
                customer_id: Some(request.customer_id.clone()),
                subscription_id: None,
                installment_id: installment_id.clone(),
                status: "PENDING".to_string(),
                value,
                net_value: None,
                billing_type: request.billing_type,
                due_date,
                invoice_url: Some(format!("https://gateway.mock/i/{}", id)),
                bank_slip_url: request
                    .billing_type
                    .capabilities()
                    .bank_slip
                    .then(|| format!("https://gateway.mock/b/{}", id)),
                deleted: false,
            };
            state.payments.insert(id, payment.clone());
            issued.push(payment);
        }

        issued
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::invalid_response("no charge issued"))
    }

    async fn list_installment_payments(
        &self,
        gateway_installment_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        self.record_call(
            "list_installment_payments",
            vec![gateway_installment_id.to_string()],
        );
        self.check_error("list_installment_payments")?;

        let mut payments: Vec<GatewayPayment> = self
            .state()
            .payments
            .values()
            .filter(|p| p.installment_id.as_deref() == Some(gateway_installment_id))
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));
        Ok(payments)
    }

    async fn get_payment(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<GatewayPayment>, GatewayError> {
        self.record_call("get_payment", vec![gateway_payment_id.to_string()]);
        self.check_error("get_payment")?;

        Ok(self.state().payments.get(gateway_payment_id).cloned())
    }

    async fn get_pix_qr_code(&self, gateway_payment_id: &str) -> Result<PixQrCode, GatewayError> {
        self.record_call("get_pix_qr_code", vec![gateway_payment_id.to_string()]);
        self.check_error("get_pix_qr_code")?;

        if !self.state().payments.contains_key(gateway_payment_id) {
            return Err(GatewayError::non_success(404, "payment not found"));
        }

        Ok(PixQrCode {
            encoded_image: "iVBORw0KGgo=".to_string(),
            payload: format!("00020101021226800014br.gov.bcb.pix{}", gateway_payment_id),
            expiration_date: None,
        })
    }
}
