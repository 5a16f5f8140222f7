use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Amount, Principal, WalletId};

/// Index of a transaction within its wallet's log, starting at 0.
pub type TransactionId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Waiting for quorum, or for a quorum approval that finds enough funds
    Pending,
    /// Funds were sent to the destination. Terminal.
    Approved,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to move pooled funds out of a wallet.
/// Only approvals are ever added; once `approved` is set the record is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    /// Member who created the request
    pub requester: Principal,
    pub description: String,
    /// Payee, not necessarily a member
    pub destination: Principal,
    /// Requested amount (always positive)
    pub value: Amount,
    /// Approving principals in approval order, without duplicates
    pub approvals: Vec<Principal>,
    pub approved: bool,
    pub requested_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        wallet_id: WalletId,
        requester: Principal,
        description: impl Into<String>,
        destination: Principal,
        value: Amount,
        requested_at: DateTime<Utc>,
    ) -> Self {
        assert!(value > 0, "Transaction value must be positive");
        Self {
            id,
            wallet_id,
            requester,
            description: description.into(),
            destination,
            value,
            approvals: Vec::new(),
            approved: false,
            requested_at,
            settled_at: None,
        }
    }

    pub fn num_approvals(&self) -> usize {
        self.approvals.len()
    }

    pub fn has_approved(&self, principal: &Principal) -> bool {
        self.approvals.contains(principal)
    }

    pub fn status(&self) -> TransactionStatus {
        if self.approved {
            TransactionStatus::Approved
        } else {
            TransactionStatus::Pending
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.approved
    }
}

/// Strict majority of the current membership.
pub fn quorum_reached(num_approvals: usize, member_count: usize) -> bool {
    num_approvals * 2 > member_count
}

/// Smallest approval count that reaches quorum for `member_count` members.
pub fn required_approvals(member_count: usize) -> usize {
    member_count / 2 + 1
}

/// Fully computed effects of sending a transaction, ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub transaction_id: TransactionId,
    pub destination: Principal,
    pub value: Amount,
    /// Amount charged to each current member
    pub share: Amount,
    /// Part of `value` not charged to anyone
    pub remainder: Amount,
    /// Member balances after the charge, in membership order
    pub charges: Vec<(Principal, Amount)>,
    pub wallet_balance_after: Amount,
}

/// What an approval will do once applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementAttempt {
    /// Quorum not reached yet
    NotReached,
    /// Quorum reached but the pool cannot cover the value
    Insufficient { balance: Amount, required: Amount },
    Ready(Settlement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPlan {
    pub transaction_id: TransactionId,
    pub approver: Principal,
    pub num_approvals: usize,
    pub member_count: usize,
    pub attempt: SettlementAttempt,
}

impl ApprovalPlan {
    pub fn settlement(&self) -> Option<&Settlement> {
        match &self.attempt {
            SettlementAttempt::Ready(settlement) => Some(settlement),
            _ => None,
        }
    }
}

/// Result of an applied approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Approval recorded, quorum still missing
    Recorded {
        num_approvals: usize,
        required: usize,
    },
    /// Approval recorded and quorum reached, but the pool is short
    Underfunded { balance: Amount, required: Amount },
    /// Approval recorded and the transaction was sent
    Settled(Settlement),
}
