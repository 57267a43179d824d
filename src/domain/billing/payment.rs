//! Payment entity: a single charge against a member.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ledger::{money, FinancialTransaction, CATEGORY_EVENT_FEE, CATEGORY_MONTHLY_DUES};
use super::{BillingType, PaymentStatus, Transition, TransitionSource};
use crate::domain::foundation::{
    MemberId, PaymentId, RegistrationId, SubscriptionId, Timestamp, ValidationError,
};

/// Customer-facing artifacts the gateway issues for a charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentArtifacts {
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    pub pix_code: Option<String>,
}

/// Membership of a charge in a split (installment) payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    /// Gateway id shared by every charge of the split.
    pub gateway_installment_id: String,
    pub count: u8,
}

/// A subscription installment or a one-off event fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub member_id: MemberId,
    pub subscription_id: Option<SubscriptionId>,
    pub registration_id: Option<RegistrationId>,
    pub gateway_payment_id: String,
    pub amount: Decimal,
    pub net_amount: Option<Decimal>,
    pub status: PaymentStatus,
    pub billing_type: BillingType,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub payment_date: Option<Timestamp>,
    pub artifacts: PaymentArtifacts,
    pub installment: Option<InstallmentPlan>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields needed to record a charge the gateway has just issued.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub member_id: MemberId,
    pub subscription_id: Option<SubscriptionId>,
    pub registration_id: Option<RegistrationId>,
    pub gateway_payment_id: String,
    pub amount: Decimal,
    pub net_amount: Option<Decimal>,
    pub billing_type: BillingType,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub artifacts: PaymentArtifacts,
}

/// Side effects the ledger must persist together with a status change.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEffects {
    pub transition: Transition<PaymentStatus>,
    /// Income line, present only on the first arrival at RECEIVED.
    pub income: Option<FinancialTransaction>,
    /// Registration this receipt counts towards. The ledger flags it as
    /// paid only once every installment of the split is RECEIVED.
    pub settled_registration: Option<RegistrationId>,
}

impl PaymentEffects {
    fn none(transition: Transition<PaymentStatus>) -> Self {
        Self {
            transition,
            income: None,
            settled_registration: None,
        }
    }
}

impl Payment {
    /// Records a freshly issued charge in PENDING.
    pub fn new(input: NewPayment, now: Timestamp) -> Result<Self, ValidationError> {
        if input.gateway_payment_id.trim().is_empty() {
            return Err(ValidationError::empty_field("gateway_payment_id"));
        }
        if input.amount <= Decimal::ZERO {
            return Err(ValidationError::not_positive("amount", input.amount));
        }

        Ok(Self {
            id: PaymentId::new(),
            member_id: input.member_id,
            subscription_id: input.subscription_id,
            registration_id: input.registration_id,
            gateway_payment_id: input.gateway_payment_id,
            amount: money(input.amount),
            net_amount: input.net_amount.map(money),
            status: PaymentStatus::Pending,
            billing_type: input.billing_type,
            description: input.description,
            due_date: input.due_date,
            payment_date: None,
            artifacts: input.artifacts,
            installment: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Attaches the split this charge belongs to. A plan of one is ignored.
    pub fn with_installment(mut self, plan: InstallmentPlan) -> Self {
        if plan.count > 1 {
            self.installment = Some(plan);
        }
        self
    }

    /// Number of RECEIVED charges that settle this payment's registration.
    pub fn installments_expected(&self) -> usize {
        self.installment
            .as_ref()
            .map_or(1, |plan| usize::from(plan.count))
    }

    pub fn is_event_fee(&self) -> bool {
        self.subscription_id.is_none()
    }

    pub fn ledger_category(&self) -> &'static str {
        if self.is_event_fee() {
            CATEGORY_EVENT_FEE
        } else {
            CATEGORY_MONTHLY_DUES
        }
    }

    /// Moves the payment towards `target` and returns what must be
    /// persisted alongside it.
    ///
    /// Rejected and unchanged requests leave the payment untouched.
    pub fn apply_transition(
        &mut self,
        target: PaymentStatus,
        source: &TransitionSource,
        at: Timestamp,
    ) -> PaymentEffects {
        let transition = Transition::decide(self.status, target);
        if !transition.is_applied() {
            return PaymentEffects::none(transition);
        }

        self.status = target;
        self.updated_at = at;

        if target != PaymentStatus::Received {
            return PaymentEffects::none(transition);
        }

        self.payment_date = Some(at);
        let income = FinancialTransaction::income_for_payment(
            self.id,
            self.member_id,
            self.amount,
            self.ledger_category(),
            format!(
                "Payment {} received ({})",
                self.gateway_payment_id, source
            ),
            at,
        );

        PaymentEffects {
            transition,
            income: Some(income),
            settled_registration: self.registration_id,
        }
    }

    /// Days elapsed since the due date, negative when not yet due.
    pub fn days_past_due(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days()
    }
}
