//! In-memory member directory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::MemberProfile;
use crate::domain::foundation::{DomainError, MemberId};
use crate::ports::MemberDirectory;

#[derive(Default)]
pub struct InMemoryMemberDirectory {
    members: RwLock<HashMap<MemberId, MemberProfile>>,
}

impl InMemoryMemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: MemberProfile) {
        self.members.write().await.insert(profile.id, profile);
    }
}

#[async_trait]
impl MemberDirectory for InMemoryMemberDirectory {
    async fn find_member(&self, member_id: MemberId) -> Result<Option<MemberProfile>, DomainError> {
        Ok(self.members.read().await.get(&member_id).cloned())
    }
}
