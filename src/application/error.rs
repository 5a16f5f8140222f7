use thiserror::Error;

use crate::domain::{WalletError, WalletId};

use super::CustodyError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("Custody transfer failed: {0}")]
    Custody(#[from] CustodyError),

    #[error("Journal cannot be replayed: {0}")]
    Journal(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// True for an unknown wallet id or transaction index.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::WalletNotFound(_) | AppError::Wallet(WalletError::TransactionNotFound { .. })
        )
    }

    /// The precondition failure behind this error, if it is one.
    pub fn wallet_error(&self) -> Option<&WalletError> {
        match self {
            AppError::Wallet(err) => Some(err),
            _ => None,
        }
    }
}
