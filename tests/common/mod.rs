// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use coffer::application::{Custody, CustodyError, InMemoryCustody, LedgerService};
use coffer::domain::{Amount, Principal, WalletId};
use tokio::sync::Mutex;

/// Helper to create a test service with in-memory custody
pub fn test_service() -> (LedgerService, Arc<InMemoryCustody>) {
    LedgerService::in_memory()
}

pub fn p(id: &str) -> Principal {
    Principal::from(id)
}

/// Sum of member balances as seen through the service
pub async fn members_total(service: &LedgerService, wallet_id: WalletId) -> Result<Amount> {
    Ok(service
        .members(wallet_id)
        .await?
        .iter()
        .map(|m| m.balance)
        .sum())
}

/// Test fixture: wallet with three equal members
pub struct StandardWallet;

impl StandardWallet {
    /// Wallet with minimum deposit 1000 joined by owner, addr1 and addr2 with 1000 each
    pub async fn three_members(service: &LedgerService) -> Result<WalletId> {
        let wallet = service.create_wallet(&p("owner"), 1000).await?;
        for member in ["owner", "addr1", "addr2"] {
            service.join_wallet(&p(member), wallet, 1000).await?;
        }
        Ok(wallet)
    }

    /// Three-member wallet with a pending 600 request by addr1 to addr3
    pub async fn with_dinner_request(service: &LedgerService) -> Result<WalletId> {
        let wallet = Self::three_members(service).await?;
        service
            .request_transaction(
                &p("addr1"),
                wallet,
                "Dinner at Jimmy's".to_string(),
                p("addr3"),
                600,
            )
            .await?;
        Ok(wallet)
    }
}

/// Custody that refuses every transfer involving one principal
pub struct RefusingCustody {
    inner: InMemoryCustody,
    refused: Principal,
    pub attempts: Mutex<usize>,
}

impl RefusingCustody {
    pub fn new(refused: Principal) -> Self {
        Self {
            inner: InMemoryCustody::new(),
            refused,
            attempts: Mutex::new(0),
        }
    }

    pub async fn net_flow(&self, principal: &Principal) -> i128 {
        self.inner.net_flow(principal).await
    }
}

#[async_trait]
impl Custody for RefusingCustody {
    async fn collect(&self, from: &Principal, amount: Amount) -> Result<(), CustodyError> {
        *self.attempts.lock().await += 1;
        if *from == self.refused {
            return Err(CustodyError::CollectRefused {
                principal: from.clone(),
                amount,
                reason: "account frozen".to_string(),
            });
        }
        self.inner.collect(from, amount).await
    }

    async fn disburse(&self, to: &Principal, amount: Amount) -> Result<(), CustodyError> {
        *self.attempts.lock().await += 1;
        if *to == self.refused {
            return Err(CustodyError::DisburseRefused {
                principal: to.clone(),
                amount,
                reason: "account frozen".to_string(),
            });
        }
        self.inner.disburse(to, amount).await
    }
}
