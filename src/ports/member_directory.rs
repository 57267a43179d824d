//! Member directory port.
//!
//! Billing does not own member data; it reads the profile fields the
//! gateway needs and the rank that decides dues eligibility.

use async_trait::async_trait;

use crate::domain::billing::MemberProfile;
use crate::domain::foundation::{DomainError, MemberId};

#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Returns `None` if the member does not exist.
    async fn find_member(&self, member_id: MemberId) -> Result<Option<MemberProfile>, DomainError>;
}
