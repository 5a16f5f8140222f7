use std::collections::HashSet;

use super::{Amount, Wallet};

/// Summary of a ledger-wide consistency check.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub wallet_count: usize,
    pub member_count: usize,
    pub transaction_count: usize,
    pub pending_count: usize,
    pub settled_count: usize,
    pub total_pooled: Amount,
    pub total_dust: Amount,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Sum of all member balances of a wallet.
pub fn member_total(wallet: &Wallet) -> u128 {
    wallet
        .member_balances
        .values()
        .map(|b| *b as u128)
        .sum()
}

/// Check the invariants of a single wallet. Returns a description of each violation.
pub fn check_wallet(wallet: &Wallet) -> Vec<String> {
    let mut issues = Vec::new();
    let id = wallet.id;

    // Members hold exactly the pool plus whatever remainder the pool absorbed
    let expected = wallet.balance as u128 + wallet.dust as u128;
    let held = member_total(wallet);
    if held != expected {
        issues.push(format!(
            "wallet {}: members hold {} but pool is {} (+{} dust)",
            id, held, wallet.balance, wallet.dust
        ));
    }

    // Absorbed dust leaves the pool short of what its members hold, so the
    // last member out may not get a refund
    if wallet.dust > 0 {
        let largest = wallet.members_with_balances().into_iter().max_by_key(|(_, b)| *b);
        if let Some((member, held)) = largest {
            if held > wallet.balance {
                issues.push(format!(
                    "wallet {}: pool {} cannot refund {} holding {} ({} dust absorbed)",
                    id, wallet.balance, member, held, wallet.dust
                ));
            }
        }
    }

    let mut seen = HashSet::new();
    for member in &wallet.members {
        if !seen.insert(member) {
            issues.push(format!("wallet {}: duplicate member {}", id, member));
        }
        if !wallet.member_balances.contains_key(member) {
            issues.push(format!("wallet {}: member {} has no balance entry", id, member));
        }
    }
    for principal in wallet.member_balances.keys() {
        if !seen.contains(principal) {
            issues.push(format!(
                "wallet {}: balance held by non-member {}",
                id, principal
            ));
        }
    }

    for (index, tx) in wallet.transactions.iter().enumerate() {
        if tx.id != index {
            issues.push(format!(
                "wallet {}: transaction at index {} has id {}",
                id, index, tx.id
            ));
        }
        if tx.wallet_id != id {
            issues.push(format!(
                "wallet {}: transaction {} belongs to wallet {}",
                id, tx.id, tx.wallet_id
            ));
        }
        if tx.value == 0 {
            issues.push(format!("wallet {}: transaction {} has zero value", id, tx.id));
        }
        let distinct: HashSet<_> = tx.approvals.iter().collect();
        if distinct.len() != tx.approvals.len() {
            issues.push(format!(
                "wallet {}: transaction {} has duplicate approvals",
                id, tx.id
            ));
        }
        if tx.approved != tx.settled_at.is_some() {
            issues.push(format!(
                "wallet {}: transaction {} settlement time does not match its status",
                id, tx.id
            ));
        }
    }

    issues
}

/// Build an integrity report across all wallets.
pub fn build_integrity_report(wallets: &[Wallet]) -> IntegrityReport {
    let mut report = IntegrityReport {
        wallet_count: wallets.len(),
        ..Default::default()
    };

    for (index, wallet) in wallets.iter().enumerate() {
        if wallet.id != index {
            report.issues.push(format!(
                "wallet at index {} has id {}",
                index, wallet.id
            ));
        }
        report.member_count += wallet.member_count();
        report.transaction_count += wallet.transactions.len();
        report.settled_count += wallet.transactions.iter().filter(|t| t.approved).count();
        report.total_pooled = report.total_pooled.saturating_add(wallet.balance);
        report.total_dust = report.total_dust.saturating_add(wallet.dust);
        report.issues.extend(check_wallet(wallet));
    }
    report.pending_count = report.transaction_count - report.settled_count;

    report
}
