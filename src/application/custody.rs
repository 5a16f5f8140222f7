use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{Amount, Principal};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("Transfer of {amount} from {principal} was refused: {reason}")]
    CollectRefused {
        principal: Principal,
        amount: Amount,
        reason: String,
    },

    #[error("Transfer of {amount} to {principal} was refused: {reason}")]
    DisburseRefused {
        principal: Principal,
        amount: Amount,
        reason: String,
    },
}

/// Holder of the real funds behind the ledger.
///
/// The ledger calls `collect` when a member pays in and `disburse` when funds
/// leave a wallet. Each call must either move the full amount or fail without
/// moving anything.
#[async_trait]
pub trait Custody: Send + Sync {
    /// Move `amount` from the principal's external funds into custody.
    async fn collect(&self, from: &Principal, amount: Amount) -> Result<(), CustodyError>;

    /// Move `amount` out of custody to an external address.
    async fn disburse(&self, to: &Principal, amount: Amount) -> Result<(), CustodyError>;
}

/// Custody that never refuses and keeps a running net flow per principal.
/// Negative flow means the principal paid in more than it received.
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    flows: Mutex<HashMap<Principal, i128>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn net_flow(&self, principal: &Principal) -> i128 {
        self.flows.lock().await.get(principal).copied().unwrap_or(0)
    }

    /// Total currently held in custody.
    pub async fn held(&self) -> i128 {
        -self.flows.lock().await.values().sum::<i128>()
    }
}

#[async_trait]
impl Custody for InMemoryCustody {
    async fn collect(&self, from: &Principal, amount: Amount) -> Result<(), CustodyError> {
        *self.flows.lock().await.entry(from.clone()).or_insert(0) -= amount as i128;
        Ok(())
    }

    async fn disburse(&self, to: &Principal, amount: Amount) -> Result<(), CustodyError> {
        *self.flows.lock().await.entry(to.clone()).or_insert(0) += amount as i128;
        Ok(())
    }
}
