//! Billing error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Ineligible | 403 |
//! | Forbidden | 403 |
//! | Unauthenticated | 401 |
//! | MemberNotFound / SubscriptionNotFound / PaymentNotFound | 404 |
//! | UnknownReference | 404 |
//! | AlreadySubscribed | 409 |
//! | InvalidTransition | 409 |
//! | ValidationFailed | 400 |
//! | GatewayUnavailable / GatewayCustomerFailed | 502 |
//! | Conflict | 503 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{
    DomainError, ErrorCode, MemberId, PaymentId, SubscriptionId, ValidationError,
};

use super::{PaymentStatus, Rank};

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Member's rank is not on the dues allow-list.
    Ineligible { member_id: MemberId, rank: Rank },

    /// Gateway timed out, was unreachable, or answered non-2xx.
    GatewayUnavailable(String),

    /// Gateway refused to create the member's customer record.
    GatewayCustomerFailed(String),

    /// Webhook signature did not verify.
    Unauthenticated,

    /// Caller lacks the role for this operation.
    Forbidden,

    MemberNotFound(MemberId),
    SubscriptionNotFound(SubscriptionId),
    PaymentNotFound(PaymentId),

    /// Gateway id with no local counterpart.
    UnknownReference(String),

    /// Member already holds an ACTIVE subscription.
    AlreadySubscribed(MemberId),

    /// Requested status is not reachable from the current one.
    InvalidTransition {
        current: PaymentStatus,
        requested: PaymentStatus,
    },

    /// Row lock could not be acquired in time.
    Conflict(String),

    ValidationFailed { field: String, message: String },

    Infrastructure(String),
}

impl BillingError {
    pub fn gateway_unavailable(message: impl Into<String>) -> Self {
        BillingError::GatewayUnavailable(message.into())
    }

    pub fn gateway_customer_failed(message: impl Into<String>) -> Self {
        BillingError::GatewayCustomerFailed(message.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::Ineligible { .. } => ErrorCode::Ineligible,
            BillingError::GatewayUnavailable(_) => ErrorCode::GatewayUnavailable,
            BillingError::GatewayCustomerFailed(_) => ErrorCode::GatewayCustomerFailed,
            BillingError::Unauthenticated => ErrorCode::Unauthenticated,
            BillingError::Forbidden => ErrorCode::Forbidden,
            BillingError::MemberNotFound(_) => ErrorCode::MemberNotFound,
            BillingError::SubscriptionNotFound(_) => ErrorCode::SubscriptionNotFound,
            BillingError::PaymentNotFound(_) => ErrorCode::PaymentNotFound,
            BillingError::UnknownReference(_) => ErrorCode::UnknownReference,
            BillingError::AlreadySubscribed(_) => ErrorCode::AlreadySubscribed,
            BillingError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            BillingError::Conflict(_) => ErrorCode::Conflict,
            BillingError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            BillingError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-facing message. Never includes gateway bodies.
    pub fn message(&self) -> String {
        match self {
            BillingError::Ineligible { rank, .. } => {
                format!("Rank '{}' is not eligible for dues billing", rank)
            }
            BillingError::GatewayUnavailable(_) => {
                "Payment gateway is unavailable, try again later".to_string()
            }
            BillingError::GatewayCustomerFailed(_) => {
                "Could not register the member at the payment gateway".to_string()
            }
            BillingError::Unauthenticated => "Invalid webhook signature".to_string(),
            BillingError::Forbidden => "Not allowed".to_string(),
            BillingError::MemberNotFound(id) => format!("Member not found: {}", id),
            BillingError::SubscriptionNotFound(id) => format!("Subscription not found: {}", id),
            BillingError::PaymentNotFound(id) => format!("Payment not found: {}", id),
            BillingError::UnknownReference(id) => format!("Unknown gateway reference: {}", id),
            BillingError::AlreadySubscribed(id) => {
                format!("Member {} already has an active subscription", id)
            }
            BillingError::InvalidTransition { current, requested } => {
                format!("Cannot move payment from {} to {}", current, requested)
            }
            BillingError::Conflict(_) => "Resource is busy, try again".to_string(),
            BillingError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::Infrastructure(_) => "Internal error".to_string(),
        }
    }

    /// Returns true if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::GatewayUnavailable(_)
                | BillingError::Conflict(_)
                | BillingError::Infrastructure(_)
        )
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::Conflict => BillingError::Conflict(err.message),
            ErrorCode::ValidationFailed => BillingError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::NotPositive { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        BillingError::ValidationFailed {
            field,
            message: err.to_string(),
        }
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ineligible_is_not_retryable() {
        let err = BillingError::Ineligible {
            member_id: MemberId::new(),
            rank: Rank::Recruta,
        };
        assert_eq!(err.code(), ErrorCode::Ineligible);
        assert!(!err.is_retryable());
        assert!(err.message().contains("recruta"));
    }

    #[test]
    fn gateway_unavailable_is_retryable_and_hides_detail() {
        let err = BillingError::gateway_unavailable("HTTP 500: {\"errors\":[\"secret\"]}");
        assert!(err.is_retryable());
        assert!(!err.message().contains("secret"));
        assert_eq!(err.code().to_string(), "GATEWAY_UNAVAILABLE");
    }

    #[test]
    fn conflict_is_retryable() {
        assert!(BillingError::Conflict("lock timeout".to_string()).is_retryable());
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = BillingError::InvalidTransition {
            current: PaymentStatus::Received,
            requested: PaymentStatus::Pending,
        };
        assert_eq!(err.message(), "Cannot move payment from RECEIVED to PENDING");
        assert!(!err.is_retryable());
    }

    #[test]
    fn domain_conflict_maps_to_conflict() {
        let err: BillingError = DomainError::conflict("lock wait exceeded").into();
        assert!(matches!(err, BillingError::Conflict(_)));
    }

    #[test]
    fn domain_database_error_maps_to_infrastructure() {
        let err: BillingError = DomainError::database("connection reset").into();
        assert!(matches!(err, BillingError::Infrastructure(_)));
        assert_eq!(err.message(), "Internal error");
    }

    #[test]
    fn validation_error_keeps_field() {
        let err: BillingError = ValidationError::empty_field("description").into();
        assert!(matches!(
            err,
            BillingError::ValidationFailed { ref field, .. } if field == "description"
        ));
    }
}
