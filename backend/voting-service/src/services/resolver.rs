//! Vote state transitions: toggle-on-repeat, switch-on-opposite.

use crate::domain::models::{Vote, VoteDirection};
use serde::Serialize;
use uuid::Uuid;

/// Ledger mutation chosen for one vote command.
///
/// Update and Delete carry the direction they were decided against, so the
/// ledger can reject them if the record changed since it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteLedgerOp {
    Insert(VoteDirection),
    Update {
        vote_id: Uuid,
        expected: VoteDirection,
        direction: VoteDirection,
    },
    Delete {
        vote_id: Uuid,
        expected: VoteDirection,
    },
}

impl VoteLedgerOp {
    /// The voter's vote on the post once this op is applied
    pub fn resulting_direction(&self) -> Option<VoteDirection> {
        match self {
            VoteLedgerOp::Insert(direction) | VoteLedgerOp::Update { direction, .. } => {
                Some(*direction)
            }
            VoteLedgerOp::Delete { .. } => None,
        }
    }

    pub fn kind(&self) -> VoteChange {
        match self {
            VoteLedgerOp::Insert(_) => VoteChange::Inserted,
            VoteLedgerOp::Update { .. } => VoteChange::Switched,
            VoteLedgerOp::Delete { .. } => VoteChange::Removed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChange {
    Inserted,
    Switched,
    Removed,
}

/// Decide the mutation for `requested` given the pair's current vote
pub fn resolve(existing: Option<&Vote>, requested: VoteDirection) -> VoteLedgerOp {
    match existing {
        None => VoteLedgerOp::Insert(requested),
        Some(vote) if vote.direction == requested => VoteLedgerOp::Delete {
            vote_id: vote.id,
            expected: vote.direction,
        },
        Some(vote) => VoteLedgerOp::Update {
            vote_id: vote.id,
            expected: vote.direction,
            direction: requested,
        },
    }
}
