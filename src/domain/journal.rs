use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, Principal, TransactionId, WalletId};

/// A committed ledger mutation, as issued by its caller.
/// Replaying the commands of a journal in order rebuilds the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerCommand {
    CreateWallet {
        min_deposit: Amount,
    },
    JoinWallet {
        wallet_id: WalletId,
        contribution: Amount,
    },
    FundWallet {
        wallet_id: WalletId,
        amount: Amount,
    },
    LeaveWallet {
        wallet_id: WalletId,
    },
    RequestTransaction {
        wallet_id: WalletId,
        description: String,
        destination: Principal,
        value: Amount,
    },
    ApproveTransaction {
        wallet_id: WalletId,
        transaction_id: TransactionId,
    },
}

impl LedgerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::CreateWallet { .. } => "create_wallet",
            LedgerCommand::JoinWallet { .. } => "join_wallet",
            LedgerCommand::FundWallet { .. } => "fund_wallet",
            LedgerCommand::LeaveWallet { .. } => "leave_wallet",
            LedgerCommand::RequestTransaction { .. } => "request_transaction",
            LedgerCommand::ApproveTransaction { .. } => "approve_transaction",
        }
    }

    /// Wallet the command targets. Wallet creation targets none.
    pub fn wallet_id(&self) -> Option<WalletId> {
        match self {
            LedgerCommand::CreateWallet { .. } => None,
            LedgerCommand::JoinWallet { wallet_id, .. }
            | LedgerCommand::FundWallet { wallet_id, .. }
            | LedgerCommand::LeaveWallet { wallet_id }
            | LedgerCommand::RequestTransaction { wallet_id, .. }
            | LedgerCommand::ApproveTransaction { wallet_id, .. } => Some(*wallet_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    /// Position in the journal, starting at 1
    pub sequence: i64,
    pub recorded_at: DateTime<Utc>,
    /// Caller the command was executed for
    pub principal: Principal,
    pub command: LedgerCommand,
}

impl JournalEntry {
    pub fn new(
        sequence: i64,
        principal: Principal,
        command: LedgerCommand,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            recorded_at,
            principal,
            command,
        }
    }
}
