//! What billing needs to know about a member and who is calling.

use serde::{Deserialize, Serialize};

use super::{BillingError, Rank};
use crate::domain::foundation::MemberId;

/// Directory data forwarded to the gateway when creating a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: MemberId,
    pub name: String,
    pub email: String,
    /// CPF, digits only.
    pub tax_id: String,
    pub phone: Option<String>,
    pub rank: Rank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Admin,
}

/// Authenticated caller, passed explicitly into every billing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub member_id: MemberId,
    pub role: MemberRole,
}

impl RequestContext {
    pub fn member(member_id: MemberId) -> Self {
        Self {
            member_id,
            role: MemberRole::Member,
        }
    }

    pub fn admin(member_id: MemberId) -> Self {
        Self {
            member_id,
            role: MemberRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == MemberRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), BillingError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(BillingError::Forbidden)
        }
    }

    /// Members may act on their own records; admins on anyone's.
    pub fn require_self_or_admin(&self, owner: MemberId) -> Result<(), BillingError> {
        if self.member_id == owner || self.is_admin() {
            Ok(())
        } else {
            Err(BillingError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_cannot_act_as_admin() {
        let ctx = RequestContext::member(MemberId::new());
        assert!(matches!(ctx.require_admin(), Err(BillingError::Forbidden)));
    }

    #[test]
    fn member_can_act_on_own_records_only() {
        let me = MemberId::new();
        let ctx = RequestContext::member(me);
        assert!(ctx.require_self_or_admin(me).is_ok());
        assert!(ctx.require_self_or_admin(MemberId::new()).is_err());
    }

    #[test]
    fn admin_can_act_on_anyone() {
        let ctx = RequestContext::admin(MemberId::new());
        assert!(ctx.require_admin().is_ok());
        assert!(ctx.require_self_or_admin(MemberId::new()).is_ok());
    }
}
