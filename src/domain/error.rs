use thiserror::Error;

use super::{Amount, Principal, TransactionId, WalletId};

/// Precondition failures raised by wallet state transitions.
/// A transition that returns one of these has not changed any state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Address is already a member: {principal} in wallet {wallet_id}")]
    AlreadyMember {
        wallet_id: WalletId,
        principal: Principal,
    },

    #[error("Address is not a member: {principal} in wallet {wallet_id}")]
    NotMember {
        wallet_id: WalletId,
        principal: Principal,
    },

    #[error("Transaction value below wallet minimum deposit: {contribution} < {min_deposit}")]
    BelowMinimumDeposit {
        min_deposit: Amount,
        contribution: Amount,
    },

    #[error("Transaction already approved by member: {principal} on transaction {transaction_id}")]
    AlreadyApproved {
        transaction_id: TransactionId,
        principal: Principal,
    },

    #[error("Wallet balance too low to send transaction: balance {balance}, required {required}")]
    InsufficientWalletBalance { balance: Amount, required: Amount },

    #[error("Transaction not found: {transaction_id} in wallet {wallet_id}")]
    TransactionNotFound {
        wallet_id: WalletId,
        transaction_id: TransactionId,
    },

    #[error("Transaction {transaction_id} has already been sent")]
    TransactionSettled { transaction_id: TransactionId },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}
