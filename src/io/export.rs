use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{JournalEntry, Wallet};

/// Ledger snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub wallets: Vec<Wallet>,
    pub journal: Vec<JournalEntry>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export wallets to CSV format
    pub async fn export_wallets_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let wallets = self.service.list_wallets().await;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "wallet_id",
            "min_deposit",
            "balance",
            "dust",
            "members",
            "transactions",
            "created_by",
            "created_at",
        ])?;

        for wallet in &wallets {
            csv_writer.write_record([
                wallet.id.to_string(),
                wallet.min_deposit.to_string(),
                wallet.balance.to_string(),
                wallet.dust.to_string(),
                wallet.member_count().to_string(),
                wallet.transactions.len().to_string(),
                wallet.created_by.to_string(),
                wallet.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(wallets.len())
    }

    /// Export member balances of every wallet to CSV format
    pub async fn export_members_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let wallets = self.service.list_wallets().await;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["wallet_id", "principal", "balance"])?;

        let mut count = 0;
        for wallet in &wallets {
            for (principal, balance) in wallet.members_with_balances() {
                csv_writer.write_record([
                    wallet.id.to_string(),
                    principal.to_string(),
                    balance.to_string(),
                ])?;
                count += 1;
            }
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export transactions of every wallet to CSV format
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let wallets = self.service.list_wallets().await;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "wallet_id",
            "transaction_id",
            "requester",
            "destination",
            "value",
            "status",
            "approvals",
            "description",
            "requested_at",
            "settled_at",
        ])?;

        let mut count = 0;
        for wallet in &wallets {
            for tx in &wallet.transactions {
                let approvals: Vec<&str> = tx.approvals.iter().map(|p| p.as_str()).collect();
                csv_writer.write_record([
                    tx.wallet_id.to_string(),
                    tx.id.to_string(),
                    tx.requester.to_string(),
                    tx.destination.to_string(),
                    tx.value.to_string(),
                    tx.status().to_string(),
                    approvals.join(";"),
                    tx.description.clone(),
                    tx.requested_at.to_rfc3339(),
                    tx.settled_at.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
                ])?;
                count += 1;
            }
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export full ledger state and journal as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            wallets: self.service.list_wallets().await,
            journal: self.service.journal().await,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
