//! PostgreSQL implementation of MemberDirectory.
//!
//! Reads the community's `members` table; billing never writes to it.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{MemberProfile, Rank};
use crate::domain::foundation::{DomainError, ErrorCode, MemberId};
use crate::ports::MemberDirectory;

use super::db_error;

pub struct PostgresMemberDirectory {
    pool: PgPool,
}

impl PostgresMemberDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    name: String,
    email: String,
    cpf: String,
    phone: Option<String>,
    rank: String,
}

impl TryFrom<MemberRow> for MemberProfile {
    type Error = DomainError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let rank: Rank = row.rank.parse().map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid rank value '{}': {}", row.rank, e),
            )
        })?;

        Ok(MemberProfile {
            id: MemberId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            tax_id: row.cpf.chars().filter(char::is_ascii_digit).collect(),
            phone: row.phone,
            rank,
        })
    }
}

#[async_trait]
impl MemberDirectory for PostgresMemberDirectory {
    async fn find_member(&self, member_id: MemberId) -> Result<Option<MemberProfile>, DomainError> {
        let row: Option<MemberRow> = sqlx::query_as(
            "SELECT id, name, email, cpf, phone, rank FROM members WHERE id = $1",
        )
        .bind(member_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find member", e))?;

        row.map(MemberProfile::try_from).transpose()
    }
}
