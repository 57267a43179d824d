//! Outcome of asking a status to move, shared by payments and subscriptions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{MemberId, StateMachine};

/// What happened when a status change was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// Status moved from `from` to `to`.
    Applied { from: S, to: S },

    /// Requested status equals the current one; nothing changed.
    Unchanged(S),

    /// Target is not reachable from the current status; nothing changed.
    Rejected { current: S, requested: S },
}

impl<S: StateMachine> Transition<S> {
    /// Decides the outcome of moving `current` to `requested` without
    /// mutating anything.
    pub fn decide(current: S, requested: S) -> Self {
        if current == requested {
            Transition::Unchanged(current)
        } else if current.can_transition_to(&requested) {
            Transition::Applied {
                from: current,
                to: requested,
            }
        } else {
            Transition::Rejected { current, requested }
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Transition::Rejected { .. })
    }

    /// Status after the transition attempt.
    pub fn resulting(&self) -> S {
        match self {
            Transition::Applied { to, .. } => *to,
            Transition::Unchanged(current) => *current,
            Transition::Rejected { current, .. } => *current,
        }
    }
}

/// Who asked for a status change. Carried into logs and ledger lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionSource {
    Webhook { event_id: String },
    Reconciliation,
    Admin { member_id: MemberId },
    Member { member_id: MemberId },
}

impl fmt::Display for TransitionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionSource::Webhook { event_id } => write!(f, "webhook:{}", event_id),
            TransitionSource::Reconciliation => f.write_str("reconciliation"),
            TransitionSource::Admin { member_id } => write!(f, "admin:{}", member_id),
            TransitionSource::Member { member_id } => write!(f, "member:{}", member_id),
        }
    }
}
