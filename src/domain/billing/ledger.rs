//! Financial ledger lines and summaries.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{MemberId, PaymentId, Timestamp, TransactionId, ValidationError};

/// Direction of money on a ledger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "INCOME",
            TransactionKind::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCOME" => Ok(TransactionKind::Income),
            "EXPENSE" => Ok(TransactionKind::Expense),
            other => Err(ValidationError::invalid_format(
                "transaction_kind",
                format!("unknown kind '{}'", other),
            )),
        }
    }
}

/// Rounds to cents and fixes the scale at two places, so `10` and `10.0`
/// both become `10.00`.
pub fn money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded
}

pub const CATEGORY_MONTHLY_DUES: &str = "MONTHLY_DUES";
pub const CATEGORY_EVENT_FEE: &str = "EVENT_FEE";

/// A single income or expense line.
///
/// Lines written for settled payments carry `payment_id`; at most one
/// line exists per payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialTransaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub payment_id: Option<PaymentId>,
    pub member_id: Option<MemberId>,
    pub occurred_on: NaiveDate,
    pub recorded_by: Option<MemberId>,
    pub created_at: Timestamp,
}

/// Input for a manually booked line.
#[derive(Debug, Clone)]
pub struct ManualEntry {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub occurred_on: NaiveDate,
    pub member_id: Option<MemberId>,
}

impl FinancialTransaction {
    /// Income recognised when a payment settles.
    pub fn income_for_payment(
        payment_id: PaymentId,
        member_id: MemberId,
        amount: Decimal,
        category: &str,
        description: String,
        at: Timestamp,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            kind: TransactionKind::Income,
            amount,
            category: category.to_string(),
            description,
            payment_id: Some(payment_id),
            member_id: Some(member_id),
            occurred_on: at.date(),
            recorded_by: None,
            created_at: at,
        }
    }

    /// Validates and builds a line booked by an administrator.
    pub fn manual(
        entry: ManualEntry,
        recorded_by: MemberId,
        at: Timestamp,
    ) -> Result<Self, ValidationError> {
        if entry.amount <= Decimal::ZERO {
            return Err(ValidationError::not_positive("amount", entry.amount));
        }
        if entry.amount.scale() > 2 {
            return Err(ValidationError::invalid_format(
                "amount",
                "at most two decimal places",
            ));
        }
        let category = entry.category.trim();
        if category.is_empty() {
            return Err(ValidationError::empty_field("category"));
        }
        let description = entry.description.trim();
        if description.is_empty() {
            return Err(ValidationError::empty_field("description"));
        }

        Ok(Self {
            id: TransactionId::new(),
            kind: entry.kind,
            amount: money(entry.amount),
            category: category.to_uppercase(),
            description: description.to_string(),
            payment_id: None,
            member_id: entry.member_id,
            occurred_on: entry.occurred_on,
            recorded_by: Some(recorded_by),
            created_at: at,
        })
    }

    /// Amount with sign: income positive, expense negative.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => -self.amount,
        }
    }
}

/// Inclusive date range filter. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPeriod {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl SummaryPeriod {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self, ValidationError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ValidationError::invalid_format(
                    "period",
                    "'from' must not be after 'to'",
                ));
            }
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// Aggregated ledger totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub balance: Decimal,
    pub transaction_count: u64,
    pub period: SummaryPeriod,
}

impl FinancialSummary {
    pub fn from_totals(
        total_income: Decimal,
        total_expense: Decimal,
        transaction_count: u64,
        period: SummaryPeriod,
    ) -> Self {
        Self {
            total_income,
            total_expense,
            balance: total_income - total_expense,
            transaction_count,
            period,
        }
    }

    /// Folds the lines that fall inside `period`.
    pub fn from_transactions<'a>(
        lines: impl IntoIterator<Item = &'a FinancialTransaction>,
        period: SummaryPeriod,
    ) -> Self {
        let mut income = Decimal::ZERO;
        let mut expense = Decimal::ZERO;
        let mut count = 0u64;
        for line in lines.into_iter().filter(|l| period.contains(l.occurred_on)) {
            match line.kind {
                TransactionKind::Income => income += line.amount,
                TransactionKind::Expense => expense += line.amount,
            }
            count += 1;
        }
        Self::from_totals(income, expense, count, period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(kind: TransactionKind, cents: i64, on: NaiveDate) -> ManualEntry {
        ManualEntry {
            kind,
            amount: Decimal::new(cents, 2),
            category: "events".to_string(),
            description: "Churrasco do batalhão".to_string(),
            occurred_on: on,
            member_id: None,
        }
    }

    #[test]
    fn manual_entry_normalises_category() {
        let line = FinancialTransaction::manual(
            entry(TransactionKind::Expense, 5000, date(2024, 3, 1)),
            MemberId::new(),
            Timestamp::now(),
        )
        .unwrap();
        assert_eq!(line.category, "EVENTS");
        assert_eq!(line.signed_amount(), Decimal::new(-5000, 2));
        assert!(line.payment_id.is_none());
    }

    #[test]
    fn manual_entry_rejects_non_positive_amount() {
        let result = FinancialTransaction::manual(
            entry(TransactionKind::Income, 0, date(2024, 3, 1)),
            MemberId::new(),
            Timestamp::now(),
        );
        assert!(matches!(result, Err(ValidationError::NotPositive { .. })));
    }

    #[test]
    fn manual_entry_rejects_sub_cent_amount() {
        let mut e = entry(TransactionKind::Income, 1, date(2024, 3, 1));
        e.amount = Decimal::new(1001, 3);
        assert!(FinancialTransaction::manual(e, MemberId::new(), Timestamp::now()).is_err());
    }

    #[test]
    fn summary_totals_respect_period() {
        let admin = MemberId::new();
        let now = Timestamp::now();
        let lines = vec![
            FinancialTransaction::manual(entry(TransactionKind::Income, 1000, date(2024, 1, 10)), admin, now).unwrap(),
            FinancialTransaction::manual(entry(TransactionKind::Income, 1000, date(2024, 2, 10)), admin, now).unwrap(),
            FinancialTransaction::manual(entry(TransactionKind::Expense, 250, date(2024, 2, 11)), admin, now).unwrap(),
        ];

        let all = FinancialSummary::from_transactions(&lines, SummaryPeriod::default());
        assert_eq!(all.total_income, Decimal::new(2000, 2));
        assert_eq!(all.balance, Decimal::new(1750, 2));
        assert_eq!(all.transaction_count, 3);

        let feb = SummaryPeriod::new(Some(date(2024, 2, 1)), Some(date(2024, 2, 29))).unwrap();
        let summary = FinancialSummary::from_transactions(&lines, feb);
        assert_eq!(summary.total_income, Decimal::new(1000, 2));
        assert_eq!(summary.total_expense, Decimal::new(250, 2));
        assert_eq!(summary.transaction_count, 2);
    }

    #[test]
    fn money_fixes_two_decimal_places() {
        assert_eq!(money(Decimal::new(10, 0)).to_string(), "10.00");
        assert_eq!(money(Decimal::new(9515, 3)).to_string(), "9.52");
    }

    #[test]
    fn period_rejects_inverted_range() {
        assert!(SummaryPeriod::new(Some(date(2024, 2, 1)), Some(date(2024, 1, 1))).is_err());
    }
}
